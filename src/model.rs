//! Core data model shared by the comparator family, the worker pool, and
//! both pipelines. See SPEC_FULL.md section 3 for the authoritative field
//! list; nothing here adds or removes a field from spec.md.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// An observation of one file or directory, produced by [`crate::storage::Storage::list`]
/// or [`crate::storage::Storage::stat`]. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub absolute_path: PathBuf,
    /// Forward-slash-normalized, rooted at the backend's root (invariant 5).
    pub relative_path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub is_dir: bool,
    /// POSIX-style permission bits; `0o644`/`0o755` on platforms without a
    /// native notion of permission bits.
    pub permissions: u32,
}

/// The outcome of one comparator invocation. Single-use: a fresh
/// `Comparison` is produced for every path pair.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub source_path: String,
    pub dest_path: String,
    pub result: ComparisonResult,
    pub reason: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonResult {
    Same,
    Different,
    SourceOnly,
    DestOnly,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    OneWay,
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMethod {
    NameSize,
    Timestamp,
    Md5,
    Sha256,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    SourceWins,
    DestWins,
    Newer,
    Both,
}

/// Configuration of one run. Validated once at construction
/// ([`SyncOperation::new`]) and read-only thereafter.
#[derive(Debug, Clone)]
pub struct SyncOperation {
    pub id: Uuid,
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub mode: SyncMode,
    pub comparison_method: ComparisonMethod,
    pub conflict_resolution: ConflictResolution,
    pub dry_run: bool,
    pub delete_orphans: bool,
    pub stateful: bool,
    pub max_workers: usize,
    /// Bytes/sec; 0 = unlimited.
    pub bandwidth_limit: u64,
    pub buffer_size: usize,
    pub exclude_patterns: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncOperation {
    /// Builds and validates a `SyncOperation`. This is the single
    /// validation point invariant 2 and the rest of the pipeline rely on:
    /// once constructed, the fields never change.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_root: PathBuf,
        dest_root: PathBuf,
        mode: SyncMode,
        comparison_method: ComparisonMethod,
        conflict_resolution: ConflictResolution,
        dry_run: bool,
        delete_orphans: bool,
        stateful: bool,
        max_workers: usize,
        bandwidth_limit: u64,
        buffer_size: usize,
        exclude_patterns: Vec<String>,
    ) -> crate::error::Result<Self> {
        if max_workers == 0 {
            return Err(crate::error::SyncError::Validation {
                field: "max_workers".into(),
                message: "must be greater than zero".into(),
            });
        }
        if buffer_size == 0 {
            return Err(crate::error::SyncError::Validation {
                field: "buffer_size".into(),
                message: "must be greater than zero".into(),
            });
        }
        if source_root.starts_with(&dest_root) || dest_root.starts_with(&source_root) {
            return Err(crate::error::SyncError::NestedPaths {
                source: source_root,
                destination: dest_root,
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            source_root,
            dest_root,
            mode,
            comparison_method,
            conflict_resolution,
            dry_run,
            delete_orphans,
            stateful,
            max_workers,
            bandwidth_limit,
            buffer_size,
            exclude_patterns,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Source,
    Dest,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Copy,
    Update,
    Delete,
    Skip,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    New,
    Modified,
    Unchanged,
    Deleted,
    Error,
    Excluded,
}

/// A per-file working record, created during scan and mutated through
/// diff/execute before being drained into the [`crate::report::Report`].
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub relative_path: String,
    pub location: Location,
    pub source_info: Option<FileInfo>,
    pub dest_info: Option<FileInfo>,
    pub action: Action,
    pub state: EntryState,
    pub error: Option<String>,
    pub bytes_transferred: u64,
}

impl FileEntry {
    pub fn new(relative_path: String, location: Location) -> Self {
        Self {
            relative_path,
            location,
            source_info: None,
            dest_info: None,
            action: Action::None,
            state: EntryState::Unchanged,
            error: None,
            bytes_transferred: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    ModifyModify,
    DeleteModify,
    ModifyDelete,
    CreateCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Source,
    Dest,
    Both,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Source => "source",
            Winner::Dest => "dest",
            Winner::Both => "both",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub relative_path: String,
    pub source_entry: Option<FileInfo>,
    pub dest_entry: Option<FileInfo>,
    pub conflict_type: ConflictType,
    pub detected_at: DateTime<Utc>,
    pub resolution: Option<ConflictResolution>,
    pub resolved_action: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub winner: Option<Winner>,
    pub result_description: Option<String>,
    pub extra_files_created: Vec<String>,
}

impl Conflict {
    pub fn new(relative_path: String, conflict_type: ConflictType) -> Self {
        Self {
            relative_path,
            source_entry: None,
            dest_entry: None,
            conflict_type,
            detected_at: Utc::now(),
            resolution: None,
            resolved_action: None,
            resolved_at: None,
            winner: None,
            result_description: None,
            extra_files_created: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferenceReason {
    CopyError,
    UpdateError,
    HashDifferent,
    ContentDifferent,
    SizeDifferent,
    OnlyInSource,
    OnlyInDest,
    Skipped,
    Deleted,
}

impl DifferenceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifferenceReason::CopyError => "CopyError",
            DifferenceReason::UpdateError => "UpdateError",
            DifferenceReason::HashDifferent => "HashDifferent",
            DifferenceReason::ContentDifferent => "ContentDifferent",
            DifferenceReason::SizeDifferent => "SizeDifferent",
            DifferenceReason::OnlyInSource => "OnlyInSource",
            DifferenceReason::OnlyInDest => "OnlyInDest",
            DifferenceReason::Skipped => "Skipped",
            DifferenceReason::Deleted => "Deleted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileDifference {
    pub relative_path: String,
    pub reason: DifferenceReason,
    pub details: String,
    pub source_info: Option<FileInfo>,
    pub dest_info: Option<FileInfo>,
}

/// Progress callback signature shared by content-reading comparators:
/// `(path, bytes_processed, total_bytes)`.
pub type ProgressCallback = std::sync::Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Minimum interval between progress callback invocations (spec.md 4.3).
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(50);
/// Minimum byte delta between progress callback invocations (spec.md 4.3).
pub const PROGRESS_BYTES: u64 = 64 * 1024;
