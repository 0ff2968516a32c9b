//! End-to-end scenarios from spec.md section 8, run against real
//! `tempfile::TempDir` trees through the library's pipeline entry points
//! (no subprocess — `main.rs` is a thin consumer of the same `run_local_sync`
//! used here, per SPEC_FULL.md section 10).

use chrono::Utc;
use std::path::Path;
use syncnorris::cancel::CancellationToken;
use syncnorris::model::{ComparisonMethod, ConflictResolution, SyncMode, SyncOperation};
use syncnorris::report::ReportStatus;
use syncnorris::storage::local::LocalStorage;
use syncnorris::storage::Storage;
use tempfile::TempDir;

fn operation(
    source: &Path,
    dest: &Path,
    mode: SyncMode,
    comparison_method: ComparisonMethod,
    conflict_resolution: ConflictResolution,
    dry_run: bool,
    delete_orphans: bool,
    stateful: bool,
) -> SyncOperation {
    SyncOperation::new(
        source.to_path_buf(),
        dest.to_path_buf(),
        mode,
        comparison_method,
        conflict_resolution,
        dry_run,
        delete_orphans,
        stateful,
        4,
        0,
        65536,
        vec![],
    )
    .unwrap()
}

/// Scenario 1: empty source, empty dest.
#[tokio::test]
async fn empty_to_empty() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let op = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::OneWay,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        false,
    );
    let report = syncnorris::run_local_sync(&op, CancellationToken::new()).await.unwrap();
    let snapshot = report.snapshot();
    assert_eq!(snapshot.scanned, 0);
    assert_eq!(report.status(), ReportStatus::Success);
}

/// Scenario 2: initial copy of a fresh tree, two files, one nested.
#[tokio::test]
async fn initial_copy() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = LocalStorage::new(src_dir.path());
    source.write("a.txt", b"hi", Utc::now(), None).await.unwrap();
    source.write("d/b.txt", b"x", Utc::now(), None).await.unwrap();

    let op = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::OneWay,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        false,
    );
    let report = syncnorris::run_local_sync(&op, CancellationToken::new()).await.unwrap();
    let snapshot = report.snapshot();
    assert_eq!(snapshot.scanned, 2);
    assert_eq!(snapshot.copied, 2);
    assert_eq!(report.status(), ReportStatus::Success);

    let dest = LocalStorage::new(dst_dir.path());
    assert_eq!(dest.read("a.txt", 0, None).await.unwrap(), b"hi");
    assert_eq!(dest.read("d/b.txt", 0, None).await.unwrap(), b"x");

    // Both sides now hold identical content; re-hash and confirm equality
    // (the quantified invariant for any `Unchanged` pair under SHA-256).
    let source_hash = syncnorris::pipeline::hash_file(&source, "a.txt", 65536).await.unwrap();
    let dest_hash = syncnorris::pipeline::hash_file(&dest, "a.txt", 65536).await.unwrap();
    assert_eq!(source_hash, dest_hash);
    assert_eq!(source_hash.len(), 64);
    assert!(source_hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

/// Scenario 3: partial-hash rejection — large files of equal size whose
/// first 256 KiB already differ must reject without a full read, and must
/// never falsely report `Same` just because sizes match.
#[tokio::test]
async fn partial_hash_rejects_large_mismatched_files() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = LocalStorage::new(src_dir.path());
    let dest = LocalStorage::new(dst_dir.path());

    let size = 2 * 1024 * 1024;
    let mut a = vec![0u8; size];
    let mut b = vec![0u8; size];
    a[0] = 1; // differs within the first 256 KiB prefix
    b[0] = 2;
    source.write("big", &a, Utc::now(), None).await.unwrap();
    dest.write("big", &b, Utc::now(), None).await.unwrap();

    let op = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::OneWay,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        false,
    );
    let report = syncnorris::run_local_sync(&op, CancellationToken::new()).await.unwrap();
    let snapshot = report.snapshot();
    assert_eq!(snapshot.updated, 1);
    assert_eq!(dest.read("big", 0, Some(1)).await.unwrap(), vec![1u8]);
}

/// Scenario 3 (size-equal guard): identical-size large files whose *only*
/// difference sits past the 256 KiB prefix must still be detected as
/// different by the full hash, not falsely short-circuited to `Same`.
#[tokio::test]
async fn partial_hash_match_falls_through_to_full_hash() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = LocalStorage::new(src_dir.path());
    let dest = LocalStorage::new(dst_dir.path());

    let size = 2 * 1024 * 1024;
    let mut a = vec![0u8; size];
    let mut b = vec![0u8; size];
    let last = size - 1;
    a[last] = 1;
    b[last] = 2;
    source.write("big", &a, Utc::now(), None).await.unwrap();
    dest.write("big", &b, Utc::now(), None).await.unwrap();

    let op = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::OneWay,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        false,
    );
    let report = syncnorris::run_local_sync(&op, CancellationToken::new()).await.unwrap();
    assert_eq!(report.snapshot().updated, 1);
}

/// Scenario 4: exclude pattern skips a matching source file.
#[tokio::test]
async fn exclude_pattern_skips_matching_files() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = LocalStorage::new(src_dir.path());
    source.write("keep.txt", b"a", Utc::now(), None).await.unwrap();
    source.write("skip.log", b"b", Utc::now(), None).await.unwrap();

    let mut op = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::OneWay,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        false,
    );
    op.exclude_patterns = vec!["*.log".to_string()];
    let report = syncnorris::run_local_sync(&op, CancellationToken::new()).await.unwrap();
    let snapshot = report.snapshot();
    assert_eq!(snapshot.scanned, 2);
    assert_eq!(snapshot.copied, 1);
    assert_eq!(snapshot.skipped, 1);
    let differences = report.differences();
    assert!(differences
        .iter()
        .any(|d| d.relative_path == "skip.log" && d.reason == syncnorris::model::DifferenceReason::Skipped));
}

/// Scenario 5: bidirectional conflict, `newer` resolution picks the source
/// when it is the most recently modified side.
#[tokio::test]
async fn bidirectional_conflict_newer_wins() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = LocalStorage::new(src_dir.path());
    let dest = LocalStorage::new(dst_dir.path());

    // Establish a common prior state (first bidirectional run).
    source.write("x", b"original", Utc::now(), None).await.unwrap();
    dest.write("x", b"original", Utc::now(), None).await.unwrap();
    let first = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::Bidirectional,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        true,
    );
    syncnorris::run_local_sync(&first, CancellationToken::new()).await.unwrap();

    // Diverge: dest edited slightly earlier, source edited later.
    let t0 = Utc::now();
    dest.write("x", b"dest-edit", t0 + chrono::Duration::seconds(5), None).await.unwrap();
    source.write("x", b"source-edit", t0 + chrono::Duration::seconds(10), None).await.unwrap();

    let second = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::Bidirectional,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        true,
    );
    let report = syncnorris::run_local_sync(&second, CancellationToken::new()).await.unwrap();
    assert_eq!(report.snapshot().conflicts, 1);
    let conflicts = report.conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].winner.unwrap().as_str(), "source");

    assert_eq!(dest.read("x", 0, None).await.unwrap(), b"source-edit");
    assert_eq!(source.read("x", 0, None).await.unwrap(), b"source-edit");
}

/// Scenario 6: delete-orphan with dry-run leaves the filesystem untouched
/// but still reports the orphan as a planned deletion.
#[tokio::test]
async fn delete_orphan_dry_run_leaves_filesystem_untouched() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = LocalStorage::new(src_dir.path());
    let dest = LocalStorage::new(dst_dir.path());
    source.write("a", b"1", Utc::now(), None).await.unwrap();
    dest.write("a", b"1", Utc::now(), None).await.unwrap();
    dest.write("b", b"2", Utc::now(), None).await.unwrap();

    let op = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::OneWay,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        true,
        true,
        false,
    );
    let report = syncnorris::run_local_sync(&op, CancellationToken::new()).await.unwrap();
    let snapshot = report.snapshot();
    assert_eq!(snapshot.scanned, 1);
    assert_eq!(snapshot.unchanged, 1);
    let differences = report.differences();
    assert!(differences
        .iter()
        .any(|d| d.relative_path == "b" && d.reason == syncnorris::model::DifferenceReason::Deleted));
    assert!(dest.exists("b").await.unwrap());
    assert!(dest.exists("a").await.unwrap());
}

/// Bidirectional convergence: a second immediate bidirectional run after a
/// successful one produces zero writes and zero conflicts.
#[tokio::test]
async fn bidirectional_convergence_after_success() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = LocalStorage::new(src_dir.path());
    source.write("a.txt", b"content", Utc::now(), None).await.unwrap();
    source.write("nested/b.txt", b"more", Utc::now(), None).await.unwrap();

    let first = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::Bidirectional,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        true,
    );
    let first_report = syncnorris::run_local_sync(&first, CancellationToken::new()).await.unwrap();
    assert_eq!(first_report.status(), ReportStatus::Success);

    let second = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::Bidirectional,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        true,
    );
    let second_report = syncnorris::run_local_sync(&second, CancellationToken::new()).await.unwrap();
    let snapshot = second_report.snapshot();
    assert_eq!(snapshot.copied, 0);
    assert_eq!(snapshot.updated, 0);
    assert_eq!(snapshot.deleted, 0);
    assert_eq!(snapshot.conflicts, 0);
}

/// Dry-run purity: a dry-run sync leaves the destination tree byte-for-byte
/// untouched, and its differences list matches a subsequent live run's.
#[tokio::test]
async fn dry_run_purity() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = LocalStorage::new(src_dir.path());
    let dest = LocalStorage::new(dst_dir.path());
    source.write("a.txt", b"new-content", Utc::now(), None).await.unwrap();
    dest.write("a.txt", b"old-content-here", Utc::now(), None).await.unwrap();

    let dry = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::OneWay,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        true,
        false,
        false,
    );
    let dry_report = syncnorris::run_local_sync(&dry, CancellationToken::new()).await.unwrap();
    assert_eq!(dest.read("a.txt", 0, None).await.unwrap(), b"old-content-here");
    let dry_paths: Vec<_> = dry_report.differences().iter().map(|d| d.relative_path.clone()).collect();

    let live = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::OneWay,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        false,
    );
    let live_report = syncnorris::run_local_sync(&live, CancellationToken::new()).await.unwrap();
    assert_eq!(dest.read("a.txt", 0, None).await.unwrap(), b"new-content");
    let live_paths: Vec<_> = live_report.differences().iter().map(|d| d.relative_path.clone()).collect();

    assert_eq!(dry_paths, live_paths);
}

/// Boundary behavior: the SHA-256 digest of an empty file is the well-known
/// constant, and empty-vs-empty compares `Same` without any read loop
/// iteration beyond the immediate EOF.
#[tokio::test]
async fn empty_file_hash_is_well_known_constant() {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path());
    storage.write("empty", b"", Utc::now(), None).await.unwrap();
    let digest = syncnorris::pipeline::hash_file(&storage, "empty", 65536).await.unwrap();
    assert_eq!(digest, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
}

/// Boundary behavior: paths with spaces and Unicode combining marks survive
/// a full round trip through scan/diff/copy.
#[tokio::test]
async fn unicode_and_space_paths_round_trip() {
    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let source = LocalStorage::new(src_dir.path());
    let name = "caf\u{00e9} notes.txt"; // precomposed é plus a literal space
    source.write(name, b"bonjour", Utc::now(), None).await.unwrap();

    let op = operation(
        src_dir.path(),
        dst_dir.path(),
        SyncMode::OneWay,
        ComparisonMethod::Sha256,
        ConflictResolution::Newer,
        false,
        false,
        false,
    );
    let report = syncnorris::run_local_sync(&op, CancellationToken::new()).await.unwrap();
    assert_eq!(report.snapshot().copied, 1);
    let dest = LocalStorage::new(dst_dir.path());
    assert_eq!(dest.read(name, 0, None).await.unwrap(), b"bonjour");
}
