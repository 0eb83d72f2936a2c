//! LabelDB Index
//!
//! The [`LabelIndex`] orchestrator owns every label bitmap and the timestamp
//! store of one data directory:
//!
//! ```text
//! set / remove / clear ──► RwLock<state> ──► dirty labels, dates flag
//!                                │                    │
//! find ──► QueryEvaluator ◄──────┘          flush worker (debounced)
//!                                                     │
//!                              commit / close ────────┴──► page + dates files
//! ```

mod error;
mod label_index;

pub use error::{IndexError, IndexResult};
pub use label_index::{LabelIndex, DATES_NAME};

use serde::Serialize;

/// Statistics about an open index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of known labels
    pub label_count: usize,
    /// Number of records with a timestamp
    pub record_count: u64,
    /// Labels changed since the last flush
    pub dirty_labels: usize,
    /// Whether timestamps changed since the last flush
    pub dates_changed: bool,
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Labels: {}, Records: {}, Pending labels: {}, Pending dates: {}",
            self.label_count, self.record_count, self.dirty_labels, self.dates_changed
        )
    }
}
