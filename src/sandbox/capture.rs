//! Bounded console capture.
//!
//! Console calls made by a running snippet stream over a channel to the host
//! as they occur, so the entries captured before a deadline abort survive the
//! abort. Capture is an observer: the sink never blocks and never raises, so
//! it cannot alter snippet control flow.

use crate::types::{LogEntry, LogKind};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde_json::Value;
use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

/// Emission-side half of the capture channel.
///
/// Lives on the worker thread for exactly one evaluation. Sequence numbers
/// are assigned here, in emission order; entries past the configured cap are
/// counted and dropped rather than captured.
pub struct LogSink {
    tx: Sender<LogEntry>,
    next_seq: Cell<u64>,
    max_entries: usize,
    dropped: Cell<u64>,
}

impl LogSink {
    /// Create a sink and the host-side receiver it feeds.
    pub fn channel(max_entries: usize) -> (LogSink, Receiver<LogEntry>) {
        let (tx, rx) = crossbeam_channel::bounded(max_entries.max(1));
        (
            LogSink {
                tx,
                next_seq: Cell::new(0),
                max_entries,
                dropped: Cell::new(0),
            },
            rx,
        )
    }

    /// Record one console call. Never blocks, never fails.
    pub fn emit(&self, kind: LogKind, arguments: Vec<Value>) {
        let seq = self.next_seq.get();
        if seq >= self.max_entries as u64 {
            self.dropped.set(self.dropped.get() + 1);
            return;
        }
        let entry = LogEntry {
            kind,
            arguments,
            sequence_number: seq,
            timestamp_ms: now_ms(),
        };
        match self.tx.try_send(entry) {
            Ok(()) => self.next_seq.set(seq + 1),
            // A full or disconnected channel means the host stopped
            // listening; the snippet must not observe that.
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.set(self.dropped.get() + 1);
            }
        }
    }

    /// Number of entries discarded after the cap was reached.
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

/// Drain everything currently buffered on the host side.
pub fn drain(rx: &Receiver<LogEntry>) -> Vec<LogEntry> {
    rx.try_iter().collect()
}

/// Milliseconds since the Unix epoch. Informational only; ordering is
/// carried by sequence numbers.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_keep_emission_order() {
        let (sink, rx) = LogSink::channel(16);
        sink.emit(LogKind::Log, vec![json!("a")]);
        sink.emit(LogKind::Warn, vec![json!("b")]);
        sink.emit(LogKind::Log, vec![json!("c"), json!(2)]);

        let entries = drain(&rx);
        assert_eq!(entries.len(), 3);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence_number, i as u64);
        }
        assert_eq!(entries[0].arguments, vec![json!("a")]);
        assert_eq!(entries[1].kind, LogKind::Warn);
        assert_eq!(entries[2].arguments, vec![json!("c"), json!(2)]);
    }

    #[test]
    fn sink_drops_past_the_cap() {
        let (sink, rx) = LogSink::channel(2);
        for i in 0..5 {
            sink.emit(LogKind::Log, vec![json!(i)]);
        }
        let entries = drain(&rx);
        assert_eq!(entries.len(), 2);
        assert_eq!(sink.dropped(), 3);
        // captured sequence numbers stay contiguous
        assert_eq!(entries[0].sequence_number, 0);
        assert_eq!(entries[1].sequence_number, 1);
    }

    #[test]
    fn sink_survives_a_dropped_receiver() {
        let (sink, rx) = LogSink::channel(4);
        drop(rx);
        // must not panic or block
        sink.emit(LogKind::Error, vec![json!("lost")]);
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn drain_on_empty_channel_is_empty() {
        let (_sink, rx) = LogSink::channel(4);
        assert!(drain(&rx).is_empty());
    }
}
