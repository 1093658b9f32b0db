//! Bounded evaluation history.
//!
//! An explicit, injected store with a fixed capacity and oldest-first
//! eviction. Records are summaries of finished evaluations; the store never
//! holds sandbox state, so it cannot undermine the engine's isolation
//! guarantees.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Summary of one finished evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub code: String,
    pub success: bool,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub timestamp_ms: u64,
}

/// Append-only ring of evaluation summaries.
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    records: VecDeque<HistoryRecord>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
        }
    }

    /// Append a record, evicting the oldest when at capacity.
    pub fn push(&mut self, record: HistoryRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Page through records, newest first.
    pub fn list(&self, offset: usize, limit: usize) -> Vec<HistoryRecord> {
        self.records
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Remove one record by ID. Returns whether anything was removed.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|record| record.id != id);
        self.records.len() != before
    }

    /// Drop everything. Returns the number of records removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
