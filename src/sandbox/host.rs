//! Isolated execution host.
//!
//! Each evaluation gets a fresh interpreter on a dedicated worker thread.
//! The deadline is enforced from outside the worker's control flow: the host
//! blocks on a rendezvous channel with a timeout and reports `Timeout` the
//! moment it elapses, whatever the snippet is doing. The worker itself is
//! guaranteed to terminate shortly after — the interpreter's loop-iteration
//! and recursion limits bound every possible divergence — so an abandoned
//! worker releases its memory instead of leaking.

use crate::sandbox::capture::{self, LogSink};
use crate::sandbox::context::{self, ContextSpec};
use crate::types::{ErrorCategory, ErrorDetail, EvalLimits, LogEntry, RawOutcome};
use boa_engine::vm::RuntimeLimits;
use boa_engine::{Context, JsError, JsNativeErrorKind, Source};
use crossbeam_channel::RecvTimeoutError;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

/// What the worker sends back over the rendezvous channel.
struct WorkerReport {
    outcome: RawOutcome,
    dropped_logs: u64,
    /// Time spent actually running the snippet, excluding interpreter and
    /// context setup.
    elapsed: Duration,
}

/// Host-side view of one finished (or aborted) execution.
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    pub outcome: RawOutcome,
    pub log: Vec<LogEntry>,
    pub elapsed: Duration,
    pub dropped_logs: u64,
}

/// Run one snippet against its capability context under the given limits.
///
/// Total: every path returns an `ExecutionOutcome`; nothing the snippet does
/// can panic or hang the caller past the deadline.
pub fn execute(code: &str, spec: ContextSpec, limits: &EvalLimits) -> ExecutionOutcome {
    let (report_tx, report_rx) = crossbeam_channel::bounded::<WorkerReport>(1);
    let (sink, log_rx) = LogSink::channel(limits.max_log_entries);
    let wrapped = wrap_snippet(code);
    let worker_limits = limits.clone();
    let started = Instant::now();

    let spawn = thread::Builder::new()
        .name("scriptbox-worker".to_string())
        .spawn(move || {
            let report = run_snippet(&wrapped, spec, sink, &worker_limits);
            // The host may have stopped listening after a deadline abort.
            let _ = report_tx.send(report);
        });

    let handle = match spawn {
        Ok(handle) => handle,
        Err(err) => {
            log::error!("failed to spawn evaluation worker: {err}");
            return ExecutionOutcome {
                outcome: RawOutcome::Faulted(ErrorDetail::new(
                    ErrorCategory::RuntimeFault,
                    "evaluation could not be started",
                )),
                log: Vec::new(),
                elapsed: Duration::ZERO,
                dropped_logs: 0,
            };
        }
    };

    match report_rx.recv_timeout(limits.deadline) {
        Ok(report) => {
            let _ = handle.join();
            ExecutionOutcome {
                outcome: report.outcome,
                log: capture::drain(&log_rx),
                elapsed: report.elapsed,
                dropped_logs: report.dropped_logs,
            }
        }
        Err(RecvTimeoutError::Timeout) => {
            // Dropping the handle detaches the worker; its runtime limits
            // will stop it shortly and its channels go nowhere.
            drop(handle);
            ExecutionOutcome {
                outcome: RawOutcome::TimedOut,
                log: capture::drain(&log_rx),
                elapsed: started.elapsed(),
                dropped_logs: 0,
            }
        }
        Err(RecvTimeoutError::Disconnected) => {
            // Worker died without reporting. Trap it here; it must never
            // surface as anything but a structured result.
            let elapsed = started.elapsed();
            let _ = handle.join();
            log::error!("evaluation worker terminated without a report");
            ExecutionOutcome {
                outcome: RawOutcome::Faulted(ErrorDetail::new(
                    ErrorCategory::RuntimeFault,
                    "evaluation terminated unexpectedly",
                )),
                log: capture::drain(&log_rx),
                elapsed,
                dropped_logs: 0,
            }
        }
    }
}

/// Wrap the snippet so a bare `return` is the early-return construct and the
/// final returned value becomes the candidate result.
fn wrap_snippet(code: &str) -> String {
    format!("(function() {{\n\"use strict\";\n{code}\n}})()")
}

/// Worker body: build the interpreter, install the capability context, run.
fn run_snippet(wrapped: &str, spec: ContextSpec, sink: LogSink, limits: &EvalLimits) -> WorkerReport {
    let sink = Rc::new(sink);
    let mut ctx = Context::default();
    let mut runtime_limits = RuntimeLimits::default();
    runtime_limits.set_loop_iteration_limit(limits.loop_iteration_limit);
    runtime_limits.set_recursion_limit(limits.recursion_limit);
    ctx.set_runtime_limits(runtime_limits);

    let mut elapsed = Duration::ZERO;
    let outcome = if let Err(err) = context::install(&mut ctx, &spec, sink.clone()) {
        log::error!("capability context installation failed: {err}");
        RawOutcome::Faulted(ErrorDetail::new(
            ErrorCategory::RuntimeFault,
            "sandbox initialization failed",
        ))
    } else {
        let run_started = Instant::now();
        let evaluated = ctx.eval(Source::from_bytes(wrapped));
        elapsed = run_started.elapsed();
        match evaluated {
            Ok(value) => match context::js_value_to_json(&value, &mut ctx) {
                None => RawOutcome::Completed(None),
                Some(json) => bound_value(json, limits.max_value_bytes),
            },
            Err(err) => RawOutcome::Faulted(classify_js_error(err, &mut ctx)),
        }
    };

    WorkerReport {
        outcome,
        dropped_logs: sink.dropped(),
        elapsed,
    }
}

/// Enforce the serialized-size cap on the returned value.
fn bound_value(json: serde_json::Value, max_bytes: usize) -> RawOutcome {
    let size = serde_json::to_vec(&json).map(|b| b.len()).unwrap_or(0);
    if size > max_bytes {
        RawOutcome::Faulted(ErrorDetail::new(
            ErrorCategory::RuntimeFault,
            format!("returned value exceeds the {max_bytes} byte limit"),
        ))
    } else {
        RawOutcome::Completed(Some(json))
    }
}

/// Map a trapped engine exception to the failure taxonomy.
///
/// Reference-kind faults are categorized as capability violations but carry
/// the engine's ordinary message, so the caller cannot distinguish a pruned
/// binding from a never-bound one. Tripped runtime limits are the
/// interpreter-level face of the deadline and classify as `Timeout`.
fn classify_js_error(err: JsError, ctx: &mut Context) -> ErrorDetail {
    match err.try_native(ctx) {
        Ok(native) => {
            let message = native.to_string();
            match native.kind {
                JsNativeErrorKind::Reference => {
                    ErrorDetail::new(ErrorCategory::CapabilityViolation, message)
                }
                JsNativeErrorKind::RuntimeLimit => ErrorDetail::new(
                    ErrorCategory::Timeout,
                    "script exceeded its execution budget",
                ),
                _ => ErrorDetail::new(ErrorCategory::RuntimeFault, message),
            }
        }
        // Thrown non-error values (`throw 42`) land here; report them as-is.
        Err(_) => ErrorDetail::new(ErrorCategory::RuntimeFault, err.to_string()),
    }
}
