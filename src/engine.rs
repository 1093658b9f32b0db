//! Evaluation pipeline: admission, context build, isolated execution,
//! result assembly.
//!
//! `Idle → Admitted → ContextBuilt → Running → {Completed | Faulted |
//! TimedOut}` — each stage is a pure gate; failure at any stage
//! short-circuits to a structured result. Terminal outcomes are reported
//! once and never retried.

use crate::admission;
use crate::observability::audit;
use crate::sandbox::capture;
use crate::sandbox::context::ContextSpec;
use crate::sandbox::host;
use crate::types::{
    ErrorCategory, ErrorDetail, EvalLimits, EvaluationRequest, EvaluationResult, LogEntry, LogKind,
    RawOutcome,
};
use std::time::Duration;

/// Stateless evaluation engine.
///
/// Holds only the limit snapshot; every call builds its own interpreter,
/// capability context, and capture channel, so arbitrarily many evaluations
/// may run concurrently without sharing anything.
#[derive(Clone, Debug)]
pub struct Evaluator {
    limits: EvalLimits,
}

impl Evaluator {
    pub fn new(limits: EvalLimits) -> Self {
        Self { limits }
    }

    pub fn with_defaults() -> Self {
        Self::new(EvalLimits::default())
    }

    pub fn limits(&self) -> &EvalLimits {
        &self.limits
    }

    /// Run one evaluation to completion.
    ///
    /// Total: every call produces exactly one [`EvaluationResult`]; no
    /// fault, hang, or escape attempt in the snippet can propagate past
    /// this boundary.
    pub fn evaluate(&self, request: &EvaluationRequest) -> EvaluationResult {
        let run_id = audit::next_run_id();

        if let Err(detail) = admission::admit(&request.code, &self.limits) {
            audit::admission_rejected(&run_id, &detail.message);
            return EvaluationResult::rejected(detail);
        }

        let spec = ContextSpec::new(
            request.context.response.clone(),
            request.context.request.clone(),
        );

        audit::evaluation_start(&run_id, request.code.len());
        let exec = host::execute(&request.code, spec, &self.limits);

        if matches!(exec.outcome, RawOutcome::TimedOut) {
            audit::deadline_kill(&run_id, self.limits.deadline.as_millis() as u64);
        }
        if exec.dropped_logs > 0 {
            audit::log_overflow(&run_id, exec.dropped_logs);
        }

        let result = assemble(exec.outcome, exec.log, exec.elapsed);
        audit::evaluation_end(&run_id, &result);
        result
    }
}

/// Pure assembly of the final result from a terminal outcome.
///
/// On success with a non-absent value, one `result`-kind entry is appended
/// after every captured entry. `elapsed` covers the running state only;
/// admission and context-build time are excluded by construction.
pub fn assemble(outcome: RawOutcome, mut log: Vec<LogEntry>, elapsed: Duration) -> EvaluationResult {
    let execution_time_ms = elapsed.as_millis() as u64;
    match outcome {
        RawOutcome::Completed(value) => {
            if let Some(v) = &value {
                let sequence_number = log
                    .last()
                    .map(|entry| entry.sequence_number + 1)
                    .unwrap_or(0);
                log.push(LogEntry {
                    kind: LogKind::Result,
                    arguments: vec![v.clone()],
                    sequence_number,
                    timestamp_ms: capture::now_ms(),
                });
            }
            EvaluationResult {
                success: true,
                value,
                log,
                error: None,
                execution_time_ms,
            }
        }
        RawOutcome::Faulted(detail) => EvaluationResult {
            success: false,
            value: None,
            log,
            error: Some(detail),
            execution_time_ms,
        },
        RawOutcome::TimedOut => EvaluationResult {
            success: false,
            value: None,
            log,
            error: Some(ErrorDetail::new(
                ErrorCategory::Timeout,
                "evaluation did not complete before the deadline",
            )),
            execution_time_ms,
        },
    }
}
