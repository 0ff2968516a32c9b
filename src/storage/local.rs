use super::Storage;
use crate::error::{Result, SyncError};
use crate::model::FileInfo;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

fn normalize_relative(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn permissions_of(metadata: &std::fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        metadata.mode() & 0o777
    }
    #[cfg(not(unix))]
    {
        if metadata.permissions().readonly() {
            0o444
        } else if metadata.is_dir() {
            0o755
        } else {
            0o644
        }
    }
}

fn to_file_info(root: &Path, absolute_path: PathBuf, metadata: &std::fs::Metadata) -> Result<FileInfo> {
    let relative_path = absolute_path
        .strip_prefix(root)
        .map_err(|_| SyncError::InvalidPath {
            path: absolute_path.clone(),
        })?;
    let modified = metadata
        .modified()
        .map_err(|e| SyncError::ReadError {
            path: absolute_path.clone(),
            source: e,
        })?;
    Ok(FileInfo {
        absolute_path: absolute_path.clone(),
        relative_path: normalize_relative(relative_path),
        size: metadata.len(),
        mtime: DateTime::<Utc>::from(modified),
        is_dir: metadata.is_dir(),
        permissions: permissions_of(metadata),
    })
}

/// Local filesystem [`Storage`] backend rooted at a fixed directory.
///
/// Grounded on the teacher's `LocalTransport`/`Scanner`, but scanning does
/// not consult `.gitignore`: a sync tool that silently skips files a user's
/// `.gitignore` happens to match would violate invariant 1 (every file under
/// source or dest is observed). Exclusion is the pipeline's job
/// (`crate::filter`), not the storage backend's.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn absolute(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list(&self) -> Result<Vec<FileInfo>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<FileInfo>> {
            let mut entries = Vec::with_capacity(256);
            let mut walker = WalkBuilder::new(&root);
            walker
                .hidden(false)
                .git_ignore(false)
                .git_global(false)
                .git_exclude(false)
                .parents(false);

            for result in walker.build() {
                let entry = match result {
                    Ok(entry) => entry,
                    // unreadable subdirectories don't abort the whole scan
                    Err(_) => continue,
                };
                let path = entry.path().to_path_buf();
                if path == root {
                    continue;
                }
                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                if let Ok(info) = to_file_info(&root, path, &metadata) {
                    entries.push(info);
                }
            }

            Ok(entries)
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e.to_string())))?
    }

    async fn stat(&self, relative_path: &str) -> Result<Option<FileInfo>> {
        let absolute = self.absolute(relative_path);
        match tokio::fs::metadata(&absolute).await {
            Ok(metadata) => Ok(Some(to_file_info(&self.root, absolute, &metadata)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::ReadError { path: absolute, source: e }),
        }
    }

    async fn read(&self, relative_path: &str, offset: u64, limit: Option<u64>) -> Result<Vec<u8>> {
        let absolute = self.absolute(relative_path);
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut file = std::fs::File::open(&absolute).map_err(|e| SyncError::ReadError {
                path: absolute.clone(),
                source: e,
            })?;
            if offset > 0 {
                file.seek(SeekFrom::Start(offset)).map_err(|e| SyncError::ReadError {
                    path: absolute.clone(),
                    source: e,
                })?;
            }
            let mut buf = match limit {
                Some(n) => {
                    // `Read::read` is permitted to return fewer bytes than
                    // requested even when more remain (e.g. on a short read
                    // from a pipe or an interrupted syscall); `take(n)` plus
                    // `read_to_end` loops until `n` bytes are collected or
                    // EOF, so two reads of the same range never disagree on
                    // length because one of them happened to return early.
                    let mut buf = Vec::with_capacity(n as usize);
                    file.take(n).read_to_end(&mut buf).map_err(|e| SyncError::ReadError {
                        path: absolute.clone(),
                        source: e,
                    })?;
                    buf
                }
                None => {
                    let mut buf = Vec::new();
                    file.read_to_end(&mut buf).map_err(|e| SyncError::ReadError {
                        path: absolute.clone(),
                        source: e,
                    })?;
                    buf
                }
            };
            buf.shrink_to_fit();
            Ok(buf)
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e.to_string())))?
    }

    async fn write(
        &self,
        relative_path: &str,
        data: &[u8],
        mtime: DateTime<Utc>,
        permissions: Option<u32>,
    ) -> Result<()> {
        let absolute = self.absolute(relative_path);
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(SyncError::Io)?;
        }
        let data = data.to_vec();
        let write_target = absolute.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut file = std::fs::File::create(&write_target).map_err(|e| SyncError::CopyError {
                path: write_target.clone(),
                source: e,
            })?;
            file.write_all(&data).map_err(|e| SyncError::CopyError {
                path: write_target.clone(),
                source: e,
            })?;
            file.flush().map_err(|e| SyncError::CopyError {
                path: write_target.clone(),
                source: e,
            })?;
            let _ = filetime::set_file_mtime(
                &write_target,
                filetime::FileTime::from_system_time(mtime.into()),
            );
            #[cfg(unix)]
            if let Some(mode) = permissions {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(&write_target, std::fs::Permissions::from_mode(mode));
            }
            #[cfg(not(unix))]
            let _ = permissions;
            Ok(())
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e.to_string())))??;
        Ok(())
    }

    async fn create_dir_all(&self, relative_path: &str) -> Result<()> {
        let absolute = self.absolute(relative_path);
        tokio::fs::create_dir_all(absolute).await.map_err(SyncError::Io)
    }

    async fn remove_file(&self, relative_path: &str) -> Result<()> {
        let absolute = self.absolute(relative_path);
        tokio::fs::remove_file(absolute).await.map_err(SyncError::Io)
    }

    async fn remove_dir_all(&self, relative_path: &str) -> Result<()> {
        let absolute = self.absolute(relative_path);
        tokio::fs::remove_dir_all(absolute).await.map_err(SyncError::Io)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}
