use crate::{FailureKind, UnitOfWork};

/// Snapshot of a session for progress reporting and the end-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionView {
    pub total: usize,
    pub completed: usize,
    pub in_flight: usize,
    pub record_count: usize,
    pub failed: Vec<(UnitOfWork, FailureKind)>,
}

impl SessionView {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Comma separated list of failed units, e.g. `page 3 (http status 500), page 7 (cancelled)`.
    pub fn failed_list(&self) -> String {
        self.failed
            .iter()
            .map(|(unit, kind)| format!("{unit} ({kind})"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
