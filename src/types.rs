/// Core types and structures for the scriptbox engine
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Hard cap on submitted snippet length, in characters.
pub const MAX_CODE_LENGTH: usize = 10_000;

/// Limit snapshot for a single evaluation.
///
/// Every evaluation runs under an explicit copy of these limits; nothing is
/// read from ambient process state while a snippet is executing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvalLimits {
    /// Maximum snippet length in characters
    pub max_code_length: usize,
    /// Wall-clock deadline for the running snippet
    pub deadline: Duration,
    /// Interpreter loop-iteration cap (bounds any runaway loop)
    pub loop_iteration_limit: u64,
    /// Interpreter recursion cap
    pub recursion_limit: usize,
    /// Maximum captured console entries per evaluation
    pub max_log_entries: usize,
    /// Maximum serialized size of the returned value, in bytes
    pub max_value_bytes: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_code_length: MAX_CODE_LENGTH,
            deadline: Duration::from_secs(5),
            loop_iteration_limit: 10_000_000,
            recursion_limit: 512,
            max_log_entries: 1_000,
            max_value_bytes: 1024 * 1024, // 1 MB
        }
    }
}

/// The read-only data pair a snippet may inspect.
///
/// Absent values default to an empty object, never to a missing binding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExchangeContext {
    #[serde(default = "empty_object")]
    pub response: Value,
    #[serde(default = "empty_object")]
    pub request: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Default for ExchangeContext {
    fn default() -> Self {
        Self {
            response: empty_object(),
            request: empty_object(),
        }
    }
}

/// One evaluation request: the snippet plus its data context.
///
/// `code` is owned by the request and immutable once admitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub code: String,
    #[serde(default)]
    pub context: ExchangeContext,
}

impl EvaluationRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            context: ExchangeContext::default(),
        }
    }

    pub fn with_context(mut self, response: Value, request: Value) -> Self {
        self.context = ExchangeContext { response, request };
        self
    }
}

/// Kind of a captured console entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Log,
    Error,
    Warn,
    Info,
    /// Synthesized final entry carrying the snippet's returned value
    Result,
}

/// One captured console call.
///
/// `sequence_number` is assigned in emission order and is the only ordering
/// guarantee; `timestamp_ms` is informational.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub arguments: Vec<Value>,
    pub sequence_number: u64,
    pub timestamp_ms: u64,
}

/// Failure taxonomy for a single evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Bad shape or size, rejected before any execution resource existed
    AdmissionRejected,
    /// The snippet reached for a name or capability that is not bound
    CapabilityViolation,
    /// Any exception raised while the snippet ran
    RuntimeFault,
    /// The deadline elapsed before the snippet completed
    Timeout,
}

/// Human-readable failure detail attached to an unsuccessful result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub category: ErrorCategory,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// Structured report of one evaluation.
///
/// Exactly one of (`success == true`, `error == None`) or
/// (`success == false`, `error == Some`) holds; `log` is always present.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub success: bool,
    pub value: Option<Value>,
    pub log: Vec<LogEntry>,
    pub error: Option<ErrorDetail>,
    pub execution_time_ms: u64,
}

impl EvaluationResult {
    /// Result for a request that never reached the execution host.
    pub fn rejected(detail: ErrorDetail) -> Self {
        Self {
            success: false,
            value: None,
            log: Vec::new(),
            error: Some(detail),
            execution_time_ms: 0,
        }
    }
}

/// Terminal outcome reported by the execution host, before assembly.
#[derive(Clone, Debug)]
pub enum RawOutcome {
    /// The snippet ran to completion; `None` means it produced no value
    Completed(Option<Value>),
    /// An exception was trapped at the host boundary
    Faulted(ErrorDetail),
    /// The deadline elapsed while the snippet was still running
    TimedOut,
}

/// Internal error type for engine plumbing.
///
/// These never cross the evaluation boundary; every caller-visible failure
/// is an [`ErrorDetail`] inside an [`EvaluationResult`].
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker error: {0}")]
    Worker(String),
}

/// Result type alias for scriptbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;
