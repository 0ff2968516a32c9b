//! Storage backend abstraction (SPEC_FULL.md component C1).
//!
//! `Storage` is the only seam the pipeline crosses to touch a filesystem.
//! The crate ships one implementation, [`local::LocalStorage`]; the trait
//! exists so tests can substitute an in-memory backend and so a future
//! remote backend (SSH/S3, out of scope here) has somewhere to plug in.

pub mod local;

use crate::error::Result;
use crate::model::FileInfo;
use async_trait::async_trait;
use std::path::Path;

/// Async filesystem operations needed by the pipeline. All paths passed in
/// are relative to the backend's own root; all paths returned are relative
/// too (forward-slash-normalized, invariant 5 of SPEC_FULL.md section 3).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Recursively lists every file and directory under the root, skipping
    /// unreadable subdirectories rather than aborting the scan.
    async fn list(&self) -> Result<Vec<FileInfo>>;

    /// Returns `Ok(None)` if the path does not exist.
    async fn stat(&self, relative_path: &str) -> Result<Option<FileInfo>>;

    async fn exists(&self, relative_path: &str) -> Result<bool> {
        Ok(self.stat(relative_path).await?.is_some())
    }

    /// Opens `relative_path` for sequential reads, honoring `offset`/`limit`
    /// so the comparator family can read partial hashes without materializing
    /// the whole file. `limit = None` reads to EOF.
    async fn read(
        &self,
        relative_path: &str,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<u8>>;

    /// Writes `data` to `relative_path`, creating parent directories and
    /// preserving `mtime` and, when given, `permissions` on the written
    /// file. Overwrites any existing file.
    async fn write(
        &self,
        relative_path: &str,
        data: &[u8],
        mtime: chrono::DateTime<chrono::Utc>,
        permissions: Option<u32>,
    ) -> Result<()>;

    async fn create_dir_all(&self, relative_path: &str) -> Result<()>;

    async fn remove_file(&self, relative_path: &str) -> Result<()>;

    async fn remove_dir_all(&self, relative_path: &str) -> Result<()>;

    fn root(&self) -> &Path;
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for std::sync::Arc<T> {
    async fn list(&self) -> Result<Vec<FileInfo>> {
        (**self).list().await
    }

    async fn stat(&self, relative_path: &str) -> Result<Option<FileInfo>> {
        (**self).stat(relative_path).await
    }

    async fn read(&self, relative_path: &str, offset: u64, limit: Option<u64>) -> Result<Vec<u8>> {
        (**self).read(relative_path, offset, limit).await
    }

    async fn write(
        &self,
        relative_path: &str,
        data: &[u8],
        mtime: chrono::DateTime<chrono::Utc>,
        permissions: Option<u32>,
    ) -> Result<()> {
        (**self).write(relative_path, data, mtime, permissions).await
    }

    async fn create_dir_all(&self, relative_path: &str) -> Result<()> {
        (**self).create_dir_all(relative_path).await
    }

    async fn remove_file(&self, relative_path: &str) -> Result<()> {
        (**self).remove_file(relative_path).await
    }

    async fn remove_dir_all(&self, relative_path: &str) -> Result<()> {
        (**self).remove_dir_all(relative_path).await
    }

    fn root(&self) -> &Path {
        (**self).root()
    }
}
