//! Cross-platform folder synchronization engine: one-way and bidirectional
//! reconciliation over a pluggable [`storage::Storage`] backend.
//!
//! `main.rs` is a thin CLI front end over the public API exposed here,
//! the way the teacher splits its binary's argument handling from the
//! reusable sync core.

pub mod bufferpool;
pub mod cancel;
pub mod cli;
pub mod comparator;
pub mod config;
pub mod error;
pub mod filter;
pub mod logger;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod ratelimit;
pub mod report;
pub mod storage;
pub mod syncstate;
pub mod workerpool;

use cancel::CancellationToken;
use error::{Result, SyncError};
use model::{SyncMode, SyncOperation};
use report::Report;
use std::sync::Arc;
use storage::local::LocalStorage;
use storage::Storage;

/// Resolves a configured worker count: `0` means "auto", mapped to the
/// detected CPU count (spec.md 4.5: "N = max_workers workers (default 5,
/// or CPU count if configured that way)").
pub fn resolve_max_workers(configured: usize) -> usize {
    if configured == 0 {
        num_cpus::get().max(1)
    } else {
        configured
    }
}

/// Runs one complete sync (or dry-run) against two local filesystem roots
/// and returns the finished [`Report`]. Dispatches to the one-way or
/// bidirectional pipeline per `op.mode`.
pub async fn run_local_sync(op: &SyncOperation, cancel: CancellationToken) -> Result<Report> {
    if !op.source_root.is_dir() {
        return Err(SyncError::SourceNotFound { path: op.source_root.clone() });
    }
    if !op.dest_root.exists() {
        std::fs::create_dir_all(&op.dest_root).map_err(|_| SyncError::DestinationNotFound {
            path: op.dest_root.clone(),
        })?;
    }

    let source: Arc<dyn Storage> = Arc::new(LocalStorage::new(&op.source_root));
    let dest: Arc<dyn Storage> = Arc::new(LocalStorage::new(&op.dest_root));

    match op.mode {
        SyncMode::OneWay => pipeline::oneway::run(op, source, dest, cancel).await,
        SyncMode::Bidirectional => pipeline::bidirectional::run(op, source, dest, cancel).await,
    }
}

/// Process exit code for a finished run, resolving spec.md section 9's
/// open question about `compare` exit codes: a compare-mode run that found
/// any difference exits `10` even though the run itself succeeded, so
/// scripts can distinguish "ran fine, trees differ" from "ran fine, trees
/// match" without parsing output. Non-compare runs map `Report::status`
/// directly.
pub fn exit_code(report: &Report, compare_mode: bool) -> i32 {
    use report::ReportStatus;
    if compare_mode && report.status() == ReportStatus::Success {
        let snapshot = report.snapshot();
        let has_differences = !report.differences().is_empty() || !report.conflicts().is_empty();
        if has_differences || snapshot.copied + snapshot.updated + snapshot.deleted > 0 {
            return 10;
        }
        return 0;
    }
    match report.status() {
        ReportStatus::Success => 0,
        ReportStatus::Partial => 1,
        ReportStatus::Failed => 2,
        ReportStatus::Cancelled => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_worker_count_resolves_to_at_least_one() {
        assert!(resolve_max_workers(0) >= 1);
        assert_eq!(resolve_max_workers(7), 7);
    }

    #[test]
    fn exit_code_maps_compare_differences_to_ten() {
        let report = Report::new();
        report.record_difference(model::FileDifference {
            relative_path: "a".into(),
            reason: model::DifferenceReason::OnlyInSource,
            details: "new".into(),
            source_info: None,
            dest_info: None,
        });
        report.stats.copied.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        report.set_status(report::ReportStatus::Success);
        assert_eq!(exit_code(&report, true), 10);
        assert_eq!(exit_code(&report, false), 0);
    }
}
