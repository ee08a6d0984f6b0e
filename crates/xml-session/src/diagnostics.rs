//! Deferred error batches
//!
//! Invocation failures are not raised; they accumulate here and are
//! queried after the fact through `exception_occurred` and friends.
//! Record order and indices are stable once an operation completes.

use serde::{Deserialize, Serialize};

/// One diagnostic entry accumulated during a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub index: usize,
}

/// Ordered batch of error records for one processor or session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    records: Vec<ErrorRecord>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; its index is its position in the batch.
    pub fn record(&mut self, message: impl Into<String>) {
        let index = self.records.len();
        self.records.push(ErrorRecord {
            message: message.into(),
            index,
        });
    }

    /// Drop all accumulated records. Called at the start of each
    /// invocation so a batch always describes the latest operation.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn exception_occurred(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn exception_count(&self) -> usize {
        self.records.len()
    }

    /// Message of the record at `index`, if any.
    pub fn error_message(&self, index: usize) -> Option<&str> {
        self.records.get(index).map(|r| r.message.as_str())
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }
}
