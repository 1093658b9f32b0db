//! External JSON wire shapes.
//!
//! The engine's internal field names stay stable; this module owns the
//! renamed external shape (`result`, `console`, `executionTime`) and the
//! shape validation that happens before admission.

use crate::sandbox::capture;
use crate::types::{
    ErrorCategory, ErrorDetail, EvaluationRequest, EvaluationResult, ExchangeContext, LogEntry,
    LogKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One console entry as the caller sees it. Order is authoritative by
/// position in the sequence, not by `timestamp`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireLogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub args: Vec<Value>,
    pub timestamp: u64,
}

impl From<LogEntry> for WireLogEntry {
    fn from(entry: LogEntry) -> Self {
        Self {
            kind: entry.kind,
            args: entry.arguments,
            timestamp: entry.timestamp_ms,
        }
    }
}

/// The full response body for one evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResult {
    pub success: bool,
    pub result: Option<Value>,
    pub console: Vec<WireLogEntry>,
    pub error: Option<ErrorDetail>,
    pub execution_time: u64,
    pub timestamp: u64,
}

impl From<EvaluationResult> for WireResult {
    fn from(result: EvaluationResult) -> Self {
        Self {
            success: result.success,
            result: result.value,
            console: result.log.into_iter().map(WireLogEntry::from).collect(),
            error: result.error,
            execution_time: result.execution_time_ms,
            timestamp: capture::now_ms(),
        }
    }
}

impl WireResult {
    /// Body for a request rejected before evaluation was attempted.
    pub fn rejection(detail: ErrorDetail) -> Self {
        EvaluationResult::rejected(detail).into()
    }
}

/// Validate the raw request body into an [`EvaluationRequest`].
///
/// Typed deserialization would collapse a non-string `code` into an opaque
/// 4xx; validating by hand keeps the structured rejection body the caller
/// expects.
pub fn parse_request(body: &Value) -> Result<EvaluationRequest, ErrorDetail> {
    let code = match body.get("code") {
        Some(Value::String(code)) => code.clone(),
        Some(_) => {
            return Err(ErrorDetail::new(
                ErrorCategory::AdmissionRejected,
                "code must be a string",
            ))
        }
        None => {
            return Err(ErrorDetail::new(
                ErrorCategory::AdmissionRejected,
                "code is required",
            ))
        }
    };

    let context = match body.get("context") {
        None | Some(Value::Null) => ExchangeContext::default(),
        Some(context) => ExchangeContext {
            response: field_or_empty_object(context, "response"),
            request: field_or_empty_object(context, "request"),
        },
    };

    Ok(EvaluationRequest { code, context })
}

fn field_or_empty_object(context: &Value, field: &str) -> Value {
    match context.get(field) {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(value) => value.clone(),
    }
}
