//! One-way pipeline (SPEC_FULL.md component C6): destination converges to
//! source. Phases follow spec.md 4.6 in order: scan, exclude, diff, orphan
//! pass, dispatch, dry-run.

use super::{
    build_comparator, classify_reason, copy_file, partition_excluded, scan, sort_deepest_first,
    Direction, TaskOutcome,
};
use crate::cancel::CancellationToken;
use crate::comparator::CompareContext;
use crate::error::Result;
use crate::filter::ExcludeFilter;
use crate::model::{
    ComparisonResult, DifferenceReason, FileDifference, SyncOperation,
};
use crate::ratelimit::RateLimiter;
use crate::report::{Report, ReportStatus};
use crate::storage::Storage;
use crate::workerpool::{Task, WorkerPool};
use std::sync::{Arc, Mutex};

/// One planned file-level action, produced by the diff phase and consumed
/// by dispatch (or recorded directly, under `dry_run`).
enum Plan {
    Copy,
    Update(String),
    Delete,
}

/// Runs one complete one-way sync/dry-run and returns the finished
/// [`Report`]. `source` and `dest` must already be validated against
/// `op.source_root`/`op.dest_root` by the caller.
pub async fn run(
    op: &SyncOperation,
    source: Arc<dyn Storage>,
    dest: Arc<dyn Storage>,
    cancel: CancellationToken,
) -> Result<Report> {
    let report = Report::for_operation(op.id, op.stateful);
    let mut comparator = build_comparator(op.comparison_method, op.buffer_size);
    let limiter = if op.bandwidth_limit > 0 {
        Some(Arc::new(Mutex::new(RateLimiter::new(op.bandwidth_limit))))
    } else {
        None
    };
    comparator.set_reader_wrapper(limiter.clone());

    let filter = ExcludeFilter::new(&op.exclude_patterns)?;

    // Phase 1: scan.
    let (source_scan, dest_scan) = tokio::try_join!(scan(source.as_ref()), scan(dest.as_ref()))?;
    report
        .stats
        .scanned
        .fetch_add(source_scan.files.len() as u64, std::sync::atomic::Ordering::Relaxed);

    // Phase 2: exclude.
    let (included, excluded) = partition_excluded(&source_scan.files, &filter);
    for path in &excluded {
        report.stats.skipped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        report.record_difference(FileDifference {
            relative_path: path.to_string(),
            reason: DifferenceReason::Skipped,
            details: "matched an exclude pattern".to_string(),
            source_info: source_scan.files.get(*path).cloned(),
            dest_info: dest_scan.files.get(*path).cloned(),
        });
    }

    // Directories: create any source directory missing at dest so empty
    // directories are materialized even when no file copy would do it.
    if !op.dry_run {
        for dir_path in source_scan.dirs.keys() {
            if filter.is_excluded(dir_path) {
                continue;
            }
            if !dest_scan.dirs.contains_key(dir_path) {
                dest.create_dir_all(dir_path).await?;
            }
        }
    }

    // Phase 3: diff.
    let mut plans: Vec<(String, Plan)> = Vec::new();
    for path in included {
        let src_info = source_scan.files.get(path).expect("scanned path missing from map");
        let dest_info = dest_scan.files.get(path);

        let ctx = CompareContext {
            source_info: Some(src_info),
            dest_info,
            cancel: &cancel,
            progress: None,
        };
        let comparison = comparator.compare(source.as_ref(), dest.as_ref(), path, &ctx).await;

        match comparison.result {
            ComparisonResult::Same => {
                report.stats.unchanged.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            ComparisonResult::SourceOnly => {
                plans.push((path.to_string(), Plan::Copy));
            }
            ComparisonResult::Different => {
                plans.push((path.to_string(), Plan::Update(comparison.reason.clone())));
            }
            ComparisonResult::DestOnly => {
                // Not reachable when iterating source paths; ignored.
            }
            ComparisonResult::Error => {
                report.record_error(format!("{path}: {}", comparison.reason));
                report.record_difference(FileDifference {
                    relative_path: path.to_string(),
                    reason: DifferenceReason::CopyError,
                    details: comparison.reason.clone(),
                    source_info: Some(src_info.clone()),
                    dest_info: dest_info.cloned(),
                });
            }
        }
    }

    // Phase 4: orphan pass.
    if op.delete_orphans {
        let mut orphans: Vec<String> = dest_scan
            .files
            .keys()
            .filter(|p| !source_scan.files.contains_key(*p))
            .cloned()
            .collect();
        orphans.extend(
            dest_scan
                .dirs
                .keys()
                .filter(|p| !source_scan.dirs.contains_key(*p) && !source_scan.files.contains_key(*p))
                .cloned(),
        );
        sort_deepest_first(&mut orphans);
        for path in orphans {
            plans.push((path, Plan::Delete));
        }
    }

    // Phase 6: dry-run — record the plan without touching any filesystem.
    if op.dry_run {
        for (path, plan) in &plans {
            record_plan_dry_run(&report, &source_scan, &dest_scan, path, plan);
        }
        finalize_status(&report, &cancel);
        return Ok(report);
    }

    // Phase 5: dispatch. Tasks are built up front, then handed to a spawned
    // submitter while this function concurrently drains results — both the
    // task and result channels are bounded (`WorkerPool::new`), so
    // submitting everything before any draining begins would deadlock once
    // a run plans more actions than the channel capacity.
    let mut pool: WorkerPool<TaskOutcome> = WorkerPool::new(op.max_workers, cancel.clone());
    let buffer_size = op.buffer_size;
    let mut tasks = Vec::with_capacity(plans.len());
    for (path, plan) in plans {
        let path_for_task = path.clone();
        let source = Arc::clone(&source);
        let dest = Arc::clone(&dest);
        let limiter = limiter.clone();
        let cancel = cancel.clone();
        let info = match &plan {
            Plan::Copy | Plan::Update(_) => source_scan.files.get(&path).cloned(),
            Plan::Delete => None,
        };
        let delete_is_dir = matches!(plan, Plan::Delete) && dest_scan.dirs.contains_key(&path);

        let work = async move {
            match plan {
                Plan::Copy => {
                    let info = info.expect("copy plan always carries source info");
                    match copy_file(source.as_ref(), dest.as_ref(), &path, &info, buffer_size, &limiter, &cancel).await {
                        Ok(bytes) => TaskOutcome::Copied { path, bytes, direction: Direction::ToDest },
                        Err(e) => TaskOutcome::Error { path, message: e.to_string() },
                    }
                }
                Plan::Update(reason) => {
                    let info = info.expect("update plan always carries source info");
                    match copy_file(source.as_ref(), dest.as_ref(), &path, &info, buffer_size, &limiter, &cancel).await {
                        Ok(bytes) => TaskOutcome::Updated { path, bytes, direction: Direction::ToDest, reason },
                        Err(e) => TaskOutcome::Error { path, message: e.to_string() },
                    }
                }
                Plan::Delete => {
                    let result = if delete_is_dir {
                        dest.remove_dir_all(&path).await
                    } else {
                        dest.remove_file(&path).await
                    };
                    match result {
                        Ok(()) => TaskOutcome::Deleted { path, direction: Direction::ToDest },
                        Err(e) => TaskOutcome::Error { path, message: e.to_string() },
                    }
                }
            }
        };
        tasks.push(Task::new(path_for_task, work));
    }

    let expected = tasks.len();
    let sender = pool.task_sender();
    let submitter = tokio::spawn(async move {
        if let Some(sender) = sender {
            for task in tasks {
                if sender.send(task).await.is_err() {
                    break;
                }
            }
        }
    });

    drain_results(&report, &mut pool, expected).await;
    let _ = submitter.await;
    pool.shutdown().await;
    finalize_status(&report, &cancel);
    Ok(report)
}

fn record_plan_dry_run(
    report: &Report,
    source_scan: &super::ScanResult,
    dest_scan: &super::ScanResult,
    path: &str,
    plan: &Plan,
) {
    use std::sync::atomic::Ordering;
    match plan {
        Plan::Copy => {
            report.stats.copied.fetch_add(1, Ordering::Relaxed);
            report.record_difference(FileDifference {
                relative_path: path.to_string(),
                reason: DifferenceReason::OnlyInSource,
                details: "present only in source".to_string(),
                source_info: source_scan.files.get(path).cloned(),
                dest_info: None,
            });
        }
        Plan::Update(reason) => {
            report.stats.updated.fetch_add(1, Ordering::Relaxed);
            report.record_difference(FileDifference {
                relative_path: path.to_string(),
                reason: classify_reason(reason),
                details: reason.clone(),
                source_info: source_scan.files.get(path).cloned(),
                dest_info: dest_scan.files.get(path).cloned(),
            });
        }
        Plan::Delete => {
            report.stats.deleted.fetch_add(1, Ordering::Relaxed);
            report.record_difference(FileDifference {
                relative_path: path.to_string(),
                reason: DifferenceReason::Deleted,
                details: "present only in destination".to_string(),
                source_info: None,
                dest_info: dest_scan.files.get(path).cloned(),
            });
        }
    }
}

/// Drains exactly `expected` results (one per submitted task). Counting
/// down rather than looping until the channel closes lets this run
/// concurrently with the submitter: the result channel only closes once
/// every worker exits, which itself requires the task channel to close —
/// something that happens only at [`WorkerPool::shutdown`], called after
/// this function returns.
async fn drain_results(report: &Report, pool: &mut WorkerPool<TaskOutcome>, expected: usize) {
    for _ in 0..expected {
        let Some(result) = pool.recv().await else { break };
        if result.cancelled {
            continue;
        }
        match result.output {
            Some(TaskOutcome::Copied { bytes, .. }) => {
                report.stats.copied.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                report.stats.bytes_transferred.fetch_add(bytes, std::sync::atomic::Ordering::Relaxed);
                report.record_difference(FileDifference {
                    relative_path: result.relative_path,
                    reason: DifferenceReason::OnlyInSource,
                    details: "copied from source".to_string(),
                    source_info: None,
                    dest_info: None,
                });
            }
            Some(TaskOutcome::Updated { bytes, reason, .. }) => {
                report.stats.updated.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                report.stats.bytes_transferred.fetch_add(bytes, std::sync::atomic::Ordering::Relaxed);
                report.record_difference(FileDifference {
                    relative_path: result.relative_path,
                    reason: classify_reason(&reason),
                    details: reason,
                    source_info: None,
                    dest_info: None,
                });
            }
            Some(TaskOutcome::Deleted { .. }) => {
                report.stats.deleted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                report.record_difference(FileDifference {
                    relative_path: result.relative_path,
                    reason: DifferenceReason::Deleted,
                    details: "removed orphan".to_string(),
                    source_info: None,
                    dest_info: None,
                });
            }
            Some(TaskOutcome::Error { message, .. }) => {
                report.record_error(format!("{}: {message}", result.relative_path));
                report.record_difference(FileDifference {
                    relative_path: result.relative_path,
                    reason: DifferenceReason::CopyError,
                    details: message,
                    source_info: None,
                    dest_info: None,
                });
            }
            None => {}
        }
    }
}

fn finalize_status(report: &Report, cancel: &CancellationToken) {
    report.finish();
    if cancel.is_cancelled() {
        report.set_status(ReportStatus::Cancelled);
        return;
    }
    let snapshot = report.snapshot();
    let succeeded = snapshot.copied + snapshot.updated + snapshot.deleted;
    let status = if snapshot.errored == 0 {
        ReportStatus::Success
    } else if succeeded > 0 {
        ReportStatus::Partial
    } else {
        ReportStatus::Failed
    };
    report.set_status(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComparisonMethod, ConflictResolution, SyncMode};
    use crate::storage::local::LocalStorage;
    use tempfile::TempDir;

    fn op(source: &std::path::Path, dest: &std::path::Path, delete_orphans: bool, dry_run: bool) -> SyncOperation {
        SyncOperation::new(
            source.to_path_buf(),
            dest.to_path_buf(),
            SyncMode::OneWay,
            ComparisonMethod::Sha256,
            ConflictResolution::Newer,
            dry_run,
            delete_orphans,
            false,
            4,
            0,
            65536,
            vec![],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_to_empty_is_success_with_no_scans() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = Arc::new(LocalStorage::new(src_dir.path()));
        let dest = Arc::new(LocalStorage::new(dst_dir.path()));
        let operation = op(src_dir.path(), dst_dir.path(), false, false);
        let report = run(&operation, source, dest, CancellationToken::new()).await.unwrap();
        let snapshot = report.snapshot();
        assert_eq!(snapshot.scanned, 0);
        assert_eq!(report.status(), ReportStatus::Success);
    }

    #[tokio::test]
    async fn initial_copy_populates_destination() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = Arc::new(LocalStorage::new(src_dir.path()));
        let dest = Arc::new(LocalStorage::new(dst_dir.path()));
        source.write("a.txt", b"hi", chrono::Utc::now(), None).await.unwrap();
        source.write("d/b.txt", b"x", chrono::Utc::now(), None).await.unwrap();

        let operation = op(src_dir.path(), dst_dir.path(), false, false);
        let report = run(&operation, source, dest.clone(), CancellationToken::new()).await.unwrap();
        let snapshot = report.snapshot();
        assert_eq!(snapshot.scanned, 2);
        assert_eq!(snapshot.copied, 2);
        assert_eq!(report.status(), ReportStatus::Success);

        assert_eq!(dest.read("a.txt", 0, None).await.unwrap(), b"hi");
        assert_eq!(dest.read("d/b.txt", 0, None).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn exclude_pattern_skips_matching_files() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = Arc::new(LocalStorage::new(src_dir.path()));
        let dest = Arc::new(LocalStorage::new(dst_dir.path()));
        source.write("keep.txt", b"a", chrono::Utc::now(), None).await.unwrap();
        source.write("skip.log", b"b", chrono::Utc::now(), None).await.unwrap();

        let mut operation = op(src_dir.path(), dst_dir.path(), false, false);
        operation.exclude_patterns = vec!["*.log".to_string()];
        let report = run(&operation, source, dest, CancellationToken::new()).await.unwrap();
        let snapshot = report.snapshot();
        assert_eq!(snapshot.scanned, 2);
        assert_eq!(snapshot.copied, 1);
        assert_eq!(snapshot.skipped, 1);
        let differences = report.differences();
        assert!(differences.iter().any(|d| d.relative_path == "skip.log" && d.reason == DifferenceReason::Skipped));
    }

    #[tokio::test]
    async fn delete_orphan_dry_run_leaves_filesystem_untouched() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = Arc::new(LocalStorage::new(src_dir.path()));
        let dest = Arc::new(LocalStorage::new(dst_dir.path()));
        source.write("a", b"1", chrono::Utc::now(), None).await.unwrap();
        dest.write("a", b"1", chrono::Utc::now(), None).await.unwrap();
        dest.write("b", b"2", chrono::Utc::now(), None).await.unwrap();

        let operation = op(src_dir.path(), dst_dir.path(), true, true);
        let report = run(&operation, source, dest.clone(), CancellationToken::new()).await.unwrap();
        let snapshot = report.snapshot();
        assert_eq!(snapshot.scanned, 1);
        assert_eq!(snapshot.unchanged, 1);
        let differences = report.differences();
        assert!(differences.iter().any(|d| d.relative_path == "b" && d.reason == DifferenceReason::Deleted));
        assert!(dest.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn delete_orphans_removes_dest_only_files() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = Arc::new(LocalStorage::new(src_dir.path()));
        let dest = Arc::new(LocalStorage::new(dst_dir.path()));
        source.write("a", b"1", chrono::Utc::now(), None).await.unwrap();
        dest.write("a", b"1", chrono::Utc::now(), None).await.unwrap();
        dest.write("b", b"2", chrono::Utc::now(), None).await.unwrap();

        let operation = op(src_dir.path(), dst_dir.path(), true, false);
        let report = run(&operation, source, dest.clone(), CancellationToken::new()).await.unwrap();
        let snapshot = report.snapshot();
        assert_eq!(snapshot.deleted, 1);
        assert!(!dest.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn update_replaces_differing_content() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = Arc::new(LocalStorage::new(src_dir.path()));
        let dest = Arc::new(LocalStorage::new(dst_dir.path()));
        source.write("a.txt", b"new", chrono::Utc::now(), None).await.unwrap();
        dest.write("a.txt", b"old-content", chrono::Utc::now(), None).await.unwrap();

        let operation = op(src_dir.path(), dst_dir.path(), false, false);
        let report = run(&operation, source, dest.clone(), CancellationToken::new()).await.unwrap();
        assert_eq!(report.snapshot().updated, 1);
        assert_eq!(dest.read("a.txt", 0, None).await.unwrap(), b"new");
    }
}
