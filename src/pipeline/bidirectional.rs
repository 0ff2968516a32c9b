//! Bidirectional pipeline (SPEC_FULL.md component C7): source and
//! destination converge to a merged state, with three-way conflict
//! detection against persisted [`crate::syncstate::SyncState`].
//!
//! Phases follow spec.md 4.7: scan+exclude (shared with [`super::oneway`]),
//! load state, classify every path, resolve conflicts per the configured
//! [`ConflictResolution`], dispatch through the same worker pool as
//! one-way, then persist fresh state on success.

use super::{
    build_comparator, copy_file, hash_file, mtime_close, partition_excluded, scan, Direction,
    TaskOutcome,
};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::filter::ExcludeFilter;
use crate::model::{
    Conflict, ConflictResolution, ConflictType, DifferenceReason, FileDifference, FileInfo,
    SyncOperation, Winner,
};
use crate::ratelimit::RateLimiter;
use crate::report::{Report, ReportStatus};
use crate::storage::Storage;
use crate::syncstate::{SyncState, SyncStateEntry, SyncStateStore};
use crate::workerpool::{Task, WorkerPool};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The per-side change status for one path, relative to the last persisted
/// [`SyncStateEntry`]. `Absent` (no prior entry and not currently present)
/// is distinct from `Deleted` (had a prior entry, now gone) — spec.md 4.7's
/// "source present only, no prior state" case depends on that distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SideState {
    Absent,
    Unchanged,
    Created,
    Modified,
    Deleted,
}

fn side_state(prior: Option<&SyncStateEntry>, current_hash: Option<&str>) -> SideState {
    if prior.is_none() && current_hash.is_none() {
        return SideState::Absent;
    }
    match crate::syncstate::classify(prior, current_hash) {
        crate::syncstate::ChangeClass::Created => SideState::Created,
        crate::syncstate::ChangeClass::Modified => SideState::Modified,
        crate::syncstate::ChangeClass::Deleted => SideState::Deleted,
        crate::syncstate::ChangeClass::Unchanged => SideState::Unchanged,
    }
}

/// A "both sides changed content that now differs" situation, returned by
/// [`combine`] before conflict resolution is applied.
enum Outcome {
    NoAction,
    PropagateToDest,
    PropagateToSource,
    DeleteDest,
    DeleteSource,
    Conflict(ConflictType),
}

/// Implements spec.md 4.7 step 4's classification table. `hashes_equal` is
/// only consulted for the two "both changed" combinations; it is `None`
/// whenever one side lacks content to compare.
fn combine(source: SideState, dest: SideState, hashes_equal: Option<bool>) -> Outcome {
    use SideState::*;
    match (source, dest) {
        (Absent, Absent) => Outcome::NoAction,
        (Absent, Deleted) | (Deleted, Absent) => Outcome::NoAction,
        (Absent, Unchanged) | (Absent, Created) | (Absent, Modified) => Outcome::PropagateToSource,
        (Unchanged, Absent) | (Created, Absent) | (Modified, Absent) => Outcome::PropagateToDest,
        (Unchanged, Unchanged) => Outcome::NoAction,
        (Unchanged, Modified) | (Unchanged, Created) => Outcome::PropagateToSource,
        (Modified, Unchanged) | (Created, Unchanged) => Outcome::PropagateToDest,
        (Deleted, Unchanged) => Outcome::DeleteDest,
        (Unchanged, Deleted) => Outcome::DeleteSource,
        (Deleted, Deleted) => Outcome::NoAction,
        (Deleted, Modified) | (Deleted, Created) => Outcome::Conflict(ConflictType::DeleteModify),
        (Modified, Deleted) | (Created, Deleted) => Outcome::Conflict(ConflictType::ModifyDelete),
        (Created, Created) => {
            if hashes_equal.unwrap_or(false) {
                Outcome::NoAction
            } else {
                Outcome::Conflict(ConflictType::CreateCreate)
            }
        }
        (Modified, Modified) | (Modified, Created) | (Created, Modified) => {
            if hashes_equal.unwrap_or(false) {
                Outcome::NoAction
            } else {
                Outcome::Conflict(ConflictType::ModifyModify)
            }
        }
    }
}

/// A concrete dispatched action, resolved from either a non-conflicting
/// [`Outcome`] or a resolved [`Conflict`].
enum BiOp {
    CopyToDest { reason: String },
    CopyToSource { reason: String },
    DeleteDest,
    DeleteSource,
    ConflictCopy { dest_named: Option<String>, source_named: Option<String> },
}

fn resolve_conflict(
    conflict_type: ConflictType,
    resolution: ConflictResolution,
    source_info: Option<&FileInfo>,
    dest_info: Option<&FileInfo>,
    path: &str,
) -> (BiOp, Winner) {
    let source_present = source_info.is_some();
    let dest_present = dest_info.is_some();

    match resolution {
        ConflictResolution::SourceWins => {
            if source_present {
                (BiOp::CopyToDest { reason: format!("conflict ({conflict_type:?}) resolved: source wins") }, Winner::Source)
            } else {
                (BiOp::DeleteDest, Winner::Source)
            }
        }
        ConflictResolution::DestWins => {
            if dest_present {
                (BiOp::CopyToSource { reason: format!("conflict ({conflict_type:?}) resolved: dest wins") }, Winner::Dest)
            } else {
                (BiOp::DeleteSource, Winner::Dest)
            }
        }
        ConflictResolution::Newer => match (source_info, dest_info) {
            (Some(s), Some(d)) => {
                if s.mtime >= d.mtime || mtime_close(s.mtime, d.mtime) && s.mtime >= d.mtime {
                    (BiOp::CopyToDest { reason: "conflict resolved: source is newer".to_string() }, Winner::Source)
                } else {
                    (BiOp::CopyToSource { reason: "conflict resolved: destination is newer".to_string() }, Winner::Dest)
                }
            }
            // One side has been deleted; the surviving side's edit is, by
            // construction, the most recent event on this path (there is no
            // deletion timestamp to compare it against), so it wins.
            (Some(_), None) => (BiOp::CopyToDest { reason: "conflict resolved: surviving edit is newer than a deletion".to_string() }, Winner::Source),
            (None, Some(_)) => (BiOp::CopyToSource { reason: "conflict resolved: surviving edit is newer than a deletion".to_string() }, Winner::Dest),
            (None, None) => (BiOp::DeleteDest, Winner::Source),
        },
        ConflictResolution::Both => {
            if source_present && dest_present {
                (
                    BiOp::ConflictCopy {
                        dest_named: Some(format!("{path}.source-conflict")),
                        source_named: Some(format!("{path}.dest-conflict")),
                    },
                    Winner::Both,
                )
            } else if source_present {
                (BiOp::CopyToDest { reason: "conflict resolved (both): restoring from surviving source copy".to_string() }, Winner::Both)
            } else {
                (BiOp::CopyToSource { reason: "conflict resolved (both): restoring from surviving destination copy".to_string() }, Winner::Both)
            }
        }
    }
}

struct HashedScan {
    files: HashMap<String, FileInfo>,
    dirs: HashMap<String, FileInfo>,
    hashes: HashMap<String, String>,
}

async fn scan_and_hash(storage: &(dyn Storage + 'static), buffer_size: usize) -> Result<HashedScan> {
    let scanned = scan(storage).await?;
    let mut hashes = HashMap::with_capacity(scanned.files.len());
    for path in scanned.files.keys() {
        let digest = hash_file(storage, path, buffer_size).await?;
        hashes.insert(path.clone(), digest);
    }
    Ok(HashedScan { files: scanned.files, dirs: scanned.dirs, hashes })
}

/// Runs one complete bidirectional sync and returns the finished [`Report`].
pub async fn run(
    op: &SyncOperation,
    source: Arc<dyn Storage>,
    dest: Arc<dyn Storage>,
    cancel: CancellationToken,
) -> Result<Report> {
    let report = Report::for_operation(op.id, op.stateful);
    let limiter = if op.bandwidth_limit > 0 {
        Some(Arc::new(Mutex::new(RateLimiter::new(op.bandwidth_limit))))
    } else {
        None
    };
    // Built but unused for comparison purposes here (classification relies
    // on persisted hashes, not the comparator family); kept so a future
    // `--comparison` override on bidirectional content checks has
    // somewhere to plug in without restructuring the pipeline.
    let _ = build_comparator(op.comparison_method, op.buffer_size);

    let filter = ExcludeFilter::new(&op.exclude_patterns)?;

    let (source_scan, dest_scan) = tokio::try_join!(
        scan_and_hash(source.as_ref(), op.buffer_size),
        scan_and_hash(dest.as_ref(), op.buffer_size),
    )?;

    let (source_state_store, dest_state_store) =
        (SyncStateStore::new(&op.source_root), SyncStateStore::new(&op.dest_root));
    let (prior_source, prior_dest) = if op.stateful {
        tokio::try_join!(source_state_store.load(), dest_state_store.load())?
    } else {
        (SyncState::default(), SyncState::default())
    };

    let mut all_paths: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    all_paths.extend(source_scan.files.keys().cloned());
    all_paths.extend(dest_scan.files.keys().cloned());
    all_paths.extend(prior_source.entries.keys().cloned());
    all_paths.extend(prior_dest.entries.keys().cloned());

    report
        .stats
        .scanned
        .fetch_add(source_scan.files.len() as u64, std::sync::atomic::Ordering::Relaxed);

    let mut ops: Vec<(String, BiOp)> = Vec::new();
    let mut conflicts: Vec<Conflict> = Vec::new();

    for path in all_paths {
        if filter.is_excluded(&path) {
            report.stats.skipped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            report.record_difference(FileDifference {
                relative_path: path.clone(),
                reason: DifferenceReason::Skipped,
                details: "matched an exclude pattern".to_string(),
                source_info: source_scan.files.get(&path).cloned(),
                dest_info: dest_scan.files.get(&path).cloned(),
            });
            continue;
        }

        let source_info = source_scan.files.get(&path);
        let dest_info = dest_scan.files.get(&path);
        let source_hash = source_scan.hashes.get(&path).map(String::as_str);
        let dest_hash = dest_scan.hashes.get(&path).map(String::as_str);

        let source_side = side_state(prior_source.entries.get(&path), source_hash);
        let dest_side = side_state(prior_dest.entries.get(&path), dest_hash);
        let hashes_equal = match (source_hash, dest_hash) {
            (Some(a), Some(b)) => Some(a == b),
            _ => None,
        };

        match combine(source_side, dest_side, hashes_equal) {
            Outcome::NoAction => {
                if source_info.is_some() {
                    report.stats.unchanged.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            }
            Outcome::PropagateToDest => {
                ops.push((path, BiOp::CopyToDest { reason: "source changed since last sync".to_string() }));
            }
            Outcome::PropagateToSource => {
                ops.push((path, BiOp::CopyToSource { reason: "destination changed since last sync".to_string() }));
            }
            Outcome::DeleteDest => ops.push((path, BiOp::DeleteDest)),
            Outcome::DeleteSource => ops.push((path, BiOp::DeleteSource)),
            Outcome::Conflict(conflict_type) => {
                let (op_to_run, winner) =
                    resolve_conflict(conflict_type, op.conflict_resolution, source_info, dest_info, &path);
                let mut conflict = Conflict::new(path.clone(), conflict_type);
                conflict.source_entry = source_info.cloned();
                conflict.dest_entry = dest_info.cloned();
                conflict.resolution = Some(op.conflict_resolution);
                conflict.winner = Some(winner);
                if let BiOp::ConflictCopy { dest_named, source_named } = &op_to_run {
                    conflict.extra_files_created = [dest_named.clone(), source_named.clone()]
                        .into_iter()
                        .flatten()
                        .collect();
                }
                conflicts.push(conflict);
                ops.push((path, op_to_run));
            }
        }
    }

    if op.dry_run {
        for (path, bi_op) in &ops {
            record_dry_run_op(&report, path, bi_op, &source_scan.files, &dest_scan.files);
        }
        for conflict in conflicts {
            report.record_conflict(conflict);
        }
        // Every conflict above already has a resolution applied (dry-run
        // still runs conflict resolution, it just never dispatches writes).
        finalize_status(&report, &cancel, true);
        return Ok(report);
    }

    for conflict in conflicts {
        report.record_conflict(conflict);
    }

    // Tasks are built up front, then handed to a spawned submitter while
    // this function concurrently drains results — both the task and result
    // channels are bounded (`WorkerPool::new`), so submitting everything
    // before any draining begins would deadlock once a run plans more
    // actions than the channel capacity.
    let mut pool: WorkerPool<TaskOutcome> = WorkerPool::new(op.max_workers, cancel.clone());
    let buffer_size = op.buffer_size;
    let mut tasks = Vec::with_capacity(ops.len());
    for (path, bi_op) in ops {
        let path_for_task = path.clone();
        let source = Arc::clone(&source);
        let dest = Arc::clone(&dest);
        let limiter = limiter.clone();
        let cancel = cancel.clone();
        let source_info = source_scan.files.get(&path).cloned();
        let dest_info = dest_scan.files.get(&path).cloned();

        let work = async move {
            match bi_op {
                BiOp::CopyToDest { reason } => {
                    let info = source_info.expect("copy-to-dest always has source info");
                    match copy_file(source.as_ref(), dest.as_ref(), &path, &info, buffer_size, &limiter, &cancel).await {
                        Ok(bytes) => TaskOutcome::Updated { path, bytes, direction: Direction::ToDest, reason },
                        Err(e) => TaskOutcome::Error { path, message: e.to_string() },
                    }
                }
                BiOp::CopyToSource { reason } => {
                    let info = dest_info.expect("copy-to-source always has dest info");
                    match copy_file(dest.as_ref(), source.as_ref(), &path, &info, buffer_size, &limiter, &cancel).await {
                        Ok(bytes) => TaskOutcome::Updated { path, bytes, direction: Direction::ToSource, reason },
                        Err(e) => TaskOutcome::Error { path, message: e.to_string() },
                    }
                }
                BiOp::DeleteDest => match dest.remove_file(&path).await {
                    Ok(()) => TaskOutcome::Deleted { path, direction: Direction::ToDest },
                    Err(e) => TaskOutcome::Error { path, message: e.to_string() },
                },
                BiOp::DeleteSource => match source.remove_file(&path).await {
                    Ok(()) => TaskOutcome::Deleted { path, direction: Direction::ToSource },
                    Err(e) => TaskOutcome::Error { path, message: e.to_string() },
                },
                BiOp::ConflictCopy { dest_named, source_named } => {
                    let mut bytes = 0u64;
                    let mut error = None;
                    if let (Some(dest_named), Some(info)) = (dest_named, source_info.clone()) {
                        match copy_file(source.as_ref(), dest.as_ref(), &dest_named, &info, buffer_size, &limiter, &cancel).await {
                            Ok(n) => bytes += n,
                            Err(e) => error = Some(e.to_string()),
                        }
                    }
                    if error.is_none() {
                        if let (Some(source_named), Some(info)) = (source_named, dest_info.clone()) {
                            match copy_file(dest.as_ref(), source.as_ref(), &source_named, &info, buffer_size, &limiter, &cancel).await {
                                Ok(n) => bytes += n,
                                Err(e) => error = Some(e.to_string()),
                            }
                        }
                    }
                    match error {
                        Some(message) => TaskOutcome::Error { path, message },
                        None => TaskOutcome::Updated { path, bytes, direction: Direction::ToDest, reason: "conflict preserved both versions".to_string() },
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

    for _ in 0..expected {
        let Some(result) = pool.recv().await else { break };
        apply_result(&report, result);
    }
    let _ = submitter.await;
    pool.shutdown().await;

    let all_conflicts_resolved = true; // every conflict above always has a resolution applied.
    finalize_status(&report, &cancel, all_conflicts_resolved);

    if op.stateful && matches!(report.status(), ReportStatus::Success | ReportStatus::Partial) {
        persist_state(source.as_ref(), &source_state_store, op.buffer_size).await?;
        persist_state(dest.as_ref(), &dest_state_store, op.buffer_size).await?;
    }

    Ok(report)
}

fn apply_result(report: &Report, result: crate::workerpool::TaskResult<TaskOutcome>) {
    if result.cancelled {
        return;
    }
    match result.output {
        Some(TaskOutcome::Copied { bytes, .. }) | Some(TaskOutcome::Updated { bytes, .. }) => {
            report.stats.updated.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            report.stats.bytes_transferred.fetch_add(bytes, std::sync::atomic::Ordering::Relaxed);
        }
        Some(TaskOutcome::Deleted { .. }) => {
            report.stats.deleted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            report.record_difference(FileDifference {
                relative_path: result.relative_path,
                reason: DifferenceReason::Deleted,
                details: "propagated deletion between source and destination".to_string(),
                source_info: None,
                dest_info: None,
            });
        }
        Some(TaskOutcome::Error { message, .. }) => {
            report.record_error(format!("{}: {message}", result.relative_path));
            report.record_difference(FileDifference {
                relative_path: result.relative_path,
                reason: DifferenceReason::UpdateError,
                details: message,
                source_info: None,
                dest_info: None,
            });
        }
        None => {}
    }
}

fn record_dry_run_op(
    report: &Report,
    path: &str,
    bi_op: &BiOp,
    source_files: &HashMap<String, FileInfo>,
    dest_files: &HashMap<String, FileInfo>,
) {
    use std::sync::atomic::Ordering;
    match bi_op {
        BiOp::CopyToDest { reason } | BiOp::CopyToSource { reason } => {
            report.stats.updated.fetch_add(1, Ordering::Relaxed);
            report.record_difference(FileDifference {
                relative_path: path.to_string(),
                reason: DifferenceReason::ContentDifferent,
                details: reason.clone(),
                source_info: source_files.get(path).cloned(),
                dest_info: dest_files.get(path).cloned(),
            });
        }
        BiOp::DeleteDest | BiOp::DeleteSource => {
            report.stats.deleted.fetch_add(1, Ordering::Relaxed);
            report.record_difference(FileDifference {
                relative_path: path.to_string(),
                reason: DifferenceReason::Deleted,
                details: "would propagate deletion".to_string(),
                source_info: source_files.get(path).cloned(),
                dest_info: dest_files.get(path).cloned(),
            });
        }
        BiOp::ConflictCopy { .. } => {
            report.stats.updated.fetch_add(1, Ordering::Relaxed);
            report.record_difference(FileDifference {
                relative_path: path.to_string(),
                reason: DifferenceReason::ContentDifferent,
                details: "conflict would be preserved on both sides".to_string(),
                source_info: source_files.get(path).cloned(),
                dest_info: dest_files.get(path).cloned(),
            });
        }
    }
}

async fn persist_state(storage: &(dyn Storage + 'static), store: &SyncStateStore, buffer_size: usize) -> Result<()> {
    let scanned = scan(storage).await?;
    let mut state = SyncState::default();
    for (path, info) in scanned.files {
        let hash = hash_file(storage, &path, buffer_size).await?;
        state.entries.insert(
            path,
            SyncStateEntry { size: info.size, mtime: info.mtime, hash, ..Default::default() }
                .with_last_sync(Utc::now()),
        );
    }
    store.save(&state).await
}

fn finalize_status(report: &Report, cancel: &CancellationToken, conflicts_resolved: bool) {
    report.finish();
    if cancel.is_cancelled() {
        report.set_status(ReportStatus::Cancelled);
        return;
    }
    let snapshot = report.snapshot();
    let succeeded = snapshot.copied + snapshot.updated + snapshot.deleted;
    let status = if snapshot.errored == 0 && (snapshot.conflicts == 0 || conflicts_resolved) {
        ReportStatus::Success
    } else if succeeded > 0 {
        ReportStatus::Partial
    } else if snapshot.errored > 0 {
        ReportStatus::Failed
    } else {
        ReportStatus::Success
    };
    report.set_status(status);
}
