//! Run outcome accumulation (SPEC_FULL.md component C8).

use crate::model::{Conflict, FileDifference};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Errors beyond this count still increment [`Stats::errored`] but are not
/// stored verbatim, per spec.md 4.8.
const MAX_STORED_ERRORS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Success,
    Partial,
    Failed,
    Cancelled,
}

/// Counters updated via atomic increments so a progress observer sees
/// monotonically increasing values without taking a lock (spec.md 4.6).
#[derive(Default)]
pub struct Stats {
    pub scanned: AtomicU64,
    pub copied: AtomicU64,
    pub updated: AtomicU64,
    pub deleted: AtomicU64,
    pub skipped: AtomicU64,
    pub unchanged: AtomicU64,
    pub errored: AtomicU64,
    pub conflicts: AtomicU64,
    pub bytes_transferred: AtomicU64,
}

impl Stats {
    fn snapshot_field(field: &AtomicU64) -> u64 {
        field.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatsSnapshot {
    pub scanned: u64,
    pub copied: u64,
    pub updated: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub unchanged: u64,
    pub errored: u64,
    pub conflicts: u64,
    pub bytes_transferred: u64,
}

pub struct Report {
    pub stats: Stats,
    operation_id: Uuid,
    stateful: bool,
    started_at: DateTime<Utc>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
    errors: Mutex<Vec<String>>,
    differences: Mutex<Vec<FileDifference>>,
    conflicts: Mutex<Vec<Conflict>>,
    pub status: Mutex<ReportStatus>,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            stats: Stats::default(),
            operation_id: Uuid::nil(),
            stateful: false,
            started_at: Utc::now(),
            ended_at: Mutex::new(None),
            errors: Mutex::new(Vec::new()),
            differences: Mutex::new(Vec::new()),
            conflicts: Mutex::new(Vec::new()),
            status: Mutex::new(ReportStatus::Success),
        }
    }
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags this report with the [`crate::model::SyncOperation`] it is
    /// accumulating results for. Called once, right after construction, by
    /// each pipeline's `run` entry point.
    pub fn for_operation(operation_id: Uuid, stateful: bool) -> Self {
        Self {
            operation_id,
            stateful,
            ..Self::default()
        }
    }

    /// Stamps `ended_at` with the current time. Idempotent: later calls
    /// overwrite the timestamp rather than erroring, so a pipeline's single
    /// `finalize_status` call site can call this unconditionally.
    pub fn finish(&self) {
        *self.ended_at.lock().expect("report mutex poisoned") = Some(Utc::now());
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn stateful(&self) -> bool {
        self.stateful
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        *self.ended_at.lock().expect("report mutex poisoned")
    }

    /// Wall-clock duration from construction to [`Report::finish`]. Zero if
    /// the report was never finished.
    pub fn duration(&self) -> Duration {
        match self.ended_at() {
            Some(end) => (end - self.started_at).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }

    /// Appends an error message, capping verbatim storage at
    /// [`MAX_STORED_ERRORS`] while `errored` keeps counting every one.
    pub fn record_error(&self, message: impl Into<String>) {
        self.stats.errored.fetch_add(1, Ordering::Relaxed);
        let mut errors = self.errors.lock().expect("report mutex poisoned");
        if errors.len() < MAX_STORED_ERRORS {
            errors.push(message.into());
        }
    }

    /// Every action-yielding task contributes exactly one difference;
    /// `Unchanged` results never call this (spec.md 4.8).
    pub fn record_difference(&self, difference: FileDifference) {
        self.differences
            .lock()
            .expect("report mutex poisoned")
            .push(difference);
    }

    pub fn record_conflict(&self, conflict: Conflict) {
        self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
        self.conflicts.lock().expect("report mutex poisoned").push(conflict);
    }

    pub fn set_status(&self, status: ReportStatus) {
        *self.status.lock().expect("report mutex poisoned") = status;
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("report mutex poisoned").clone()
    }

    pub fn differences(&self) -> Vec<FileDifference> {
        self.differences.lock().expect("report mutex poisoned").clone()
    }

    pub fn conflicts(&self) -> Vec<Conflict> {
        self.conflicts.lock().expect("report mutex poisoned").clone()
    }

    pub fn status(&self) -> ReportStatus {
        *self.status.lock().expect("report mutex poisoned")
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            scanned: Stats::snapshot_field(&self.stats.scanned),
            copied: Stats::snapshot_field(&self.stats.copied),
            updated: Stats::snapshot_field(&self.stats.updated),
            deleted: Stats::snapshot_field(&self.stats.deleted),
            skipped: Stats::snapshot_field(&self.stats.skipped),
            unchanged: Stats::snapshot_field(&self.stats.unchanged),
            errored: Stats::snapshot_field(&self.stats.errored),
            conflicts: Stats::snapshot_field(&self.stats.conflicts),
            bytes_transferred: Stats::snapshot_field(&self.stats.bytes_transferred),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DifferenceReason;

    #[test]
    fn caps_stored_errors_but_keeps_counting() {
        let report = Report::new();
        for i in 0..150 {
            report.record_error(format!("error {i}"));
        }
        assert_eq!(report.errors().len(), MAX_STORED_ERRORS);
        assert_eq!(report.snapshot().errored, 150);
    }

    #[test]
    fn finish_records_a_nonzero_duration() {
        let report = Report::for_operation(Uuid::new_v4(), true);
        std::thread::sleep(std::time::Duration::from_millis(5));
        report.finish();
        assert!(report.duration() >= std::time::Duration::from_millis(1));
        assert!(report.stateful());
    }

    #[test]
    fn differences_accumulate() {
        let report = Report::new();
        report.record_difference(FileDifference {
            relative_path: "a.txt".into(),
            reason: DifferenceReason::OnlyInSource,
            details: "new file".into(),
            source_info: None,
            dest_info: None,
        });
        assert_eq!(report.differences().len(), 1);
    }
}
