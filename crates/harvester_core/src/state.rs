use std::collections::HashSet;

use crate::view_model::SessionView;
use crate::{RawRecord, UnitFailure, UnitOfWork};

/// Records produced by one successful unit, kept together so per-unit
/// artifacts can still be written.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRecords {
    pub unit: UnitOfWork,
    pub records: Vec<RawRecord>,
}

/// Aggregate of one harvest run.
///
/// Every unit registered at construction ends up exactly once in either
/// `successes` or `failures`; completions for unknown or already settled
/// units are counted as stray and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HarvestSession {
    units: Vec<UnitOfWork>,
    pending: HashSet<UnitOfWork>,
    in_flight: HashSet<UnitOfWork>,
    successes: Vec<UnitRecords>,
    failures: Vec<UnitFailure>,
    stray_completions: usize,
}

impl HarvestSession {
    /// Registers the units of a run. Duplicates collapse to their first occurrence.
    pub fn new<I>(units: I) -> Self
    where
        I: IntoIterator<Item = UnitOfWork>,
    {
        let mut pending = HashSet::new();
        let mut ordered = Vec::new();
        for unit in units {
            if pending.insert(unit.clone()) {
                ordered.push(unit);
            }
        }
        Self {
            units: ordered,
            pending,
            ..Self::default()
        }
    }

    /// Units in registration order.
    pub fn units(&self) -> &[UnitOfWork] {
        &self.units
    }

    pub fn total(&self) -> usize {
        self.units.len()
    }

    pub fn completed(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn successes(&self) -> &[UnitRecords] {
        &self.successes
    }

    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    pub fn stray_completions(&self) -> usize {
        self.stray_completions
    }

    pub fn record_count(&self) -> usize {
        self.successes.iter().map(|s| s.records.len()).sum()
    }

    /// All records in completion order.
    pub fn records(&self) -> impl Iterator<Item = &RawRecord> {
        self.successes.iter().flat_map(|s| s.records.iter())
    }

    pub fn into_parts(self) -> (Vec<UnitRecords>, Vec<UnitFailure>) {
        (self.successes, self.failures)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            total: self.total(),
            completed: self.completed(),
            in_flight: self.in_flight.len(),
            record_count: self.record_count(),
            failed: self
                .failures
                .iter()
                .map(|f| (f.unit.clone(), f.kind.clone()))
                .collect(),
        }
    }

    pub(crate) fn mark_started(&mut self, unit: UnitOfWork) {
        if self.pending.contains(&unit) {
            self.in_flight.insert(unit);
        }
    }

    /// Removes `unit` from the pending set; false if it was not pending.
    pub(crate) fn settle(&mut self, unit: &UnitOfWork) -> bool {
        self.in_flight.remove(unit);
        if self.pending.remove(unit) {
            true
        } else {
            self.stray_completions += 1;
            false
        }
    }

    pub(crate) fn push_success(&mut self, unit: UnitOfWork, records: Vec<RawRecord>) {
        self.successes.push(UnitRecords { unit, records });
    }

    pub(crate) fn push_failure(&mut self, failure: UnitFailure) {
        self.failures.push(failure);
    }
}
