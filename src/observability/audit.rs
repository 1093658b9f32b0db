//! Structured audit events for the evaluation lifecycle.
//!
//! Every evaluation gets a correlation ID; lifecycle events are emitted
//! through the standard logger and, when configured, appended as JSON lines
//! to an audit file. Audit is observability only — it never influences an
//! evaluation's outcome.

use crate::types::{EvaluationResult, Result, SandboxError};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;
use uuid::Uuid;

/// Types of lifecycle events we track
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum AuditEventType {
    EvaluationStart,
    EvaluationEnd,
    AdmissionRejected,
    DeadlineKill,
    LogOverflow,
}

impl AuditEventType {
    fn is_warning(self) -> bool {
        matches!(
            self,
            AuditEventType::AdmissionRejected
                | AuditEventType::DeadlineKill
                | AuditEventType::LogOverflow
        )
    }
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub run_id: String,
    pub timestamp: SystemTime,
    pub details: String,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, run_id: &str, details: String) -> Self {
        Self {
            event_type,
            run_id: run_id.to_string(),
            timestamp: SystemTime::now(),
            details,
        }
    }
}

/// File-backed audit sink. Absent a configured file, events still reach the
/// standard logger.
pub struct AuditLogger {
    file: Option<Mutex<File>>,
}

impl AuditLogger {
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        SandboxError::Config(format!("failed to create audit log directory: {e}"))
                    })?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| SandboxError::Config(format!("failed to open audit log: {e}")))?;
                Some(Mutex::new(file))
            }
            None => None,
        };
        Ok(Self { file })
    }

    pub fn emit(&self, event: AuditEvent) {
        if event.event_type.is_warning() {
            warn!(
                "audit: {:?} run_id={} {}",
                event.event_type, event.run_id, event.details
            );
        } else {
            info!(
                "audit: {:?} run_id={} {}",
                event.event_type, event.run_id, event.details
            );
        }

        if let Some(file) = &self.file {
            let line = serde_json::json!({
                "timestamp": event
                    .timestamp
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
                "event_type": event.event_type,
                "run_id": event.run_id,
                "details": event.details,
            });
            if let Ok(mut file) = file.lock() {
                if let Err(e) = writeln!(file, "{line}") {
                    error!("failed to write audit log entry: {e}");
                }
            }
        }
    }
}

static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Initialize the global audit logger. Without this, events degrade to the
/// standard logger only.
pub fn init(path: Option<PathBuf>) -> Result<()> {
    let logger = AuditLogger::new(path)?;
    if AUDIT_LOGGER.set(logger).is_err() {
        warn!("audit logger already initialized");
    }
    Ok(())
}

fn emit(event: AuditEvent) {
    match AUDIT_LOGGER.get() {
        Some(logger) => logger.emit(event),
        None => {
            // Unconfigured: keep the standard-log half of the behavior.
            AuditLogger { file: None }.emit(event);
        }
    }
}

/// Fresh correlation ID for one evaluation.
pub fn next_run_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn evaluation_start(run_id: &str, code_len: usize) {
    emit(AuditEvent::new(
        AuditEventType::EvaluationStart,
        run_id,
        format!("code_len={code_len}"),
    ));
}

pub fn evaluation_end(run_id: &str, result: &EvaluationResult) {
    emit(AuditEvent::new(
        AuditEventType::EvaluationEnd,
        run_id,
        format!(
            "success={} elapsed_ms={} log_entries={}",
            result.success,
            result.execution_time_ms,
            result.log.len()
        ),
    ));
}

pub fn admission_rejected(run_id: &str, reason: &str) {
    emit(AuditEvent::new(
        AuditEventType::AdmissionRejected,
        run_id,
        format!("reason={reason}"),
    ));
}

pub fn deadline_kill(run_id: &str, deadline_ms: u64) {
    emit(AuditEvent::new(
        AuditEventType::DeadlineKill,
        run_id,
        format!("deadline_ms={deadline_ms}"),
    ));
}

pub fn log_overflow(run_id: &str, dropped: u64) {
    emit(AuditEvent::new(
        AuditEventType::LogOverflow,
        run_id,
        format!("dropped={dropped}"),
    ));
}
