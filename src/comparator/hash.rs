use super::{existence_result, CompareContext, Comparator, ProgressThrottle};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::model::{Comparison, ComparisonResult};
use crate::ratelimit::RateLimiter;
use crate::storage::Storage;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Size above which the partial-hash fast-rejection path engages
/// (spec.md 4.3).
const PARTIAL_THRESHOLD: u64 = 1024 * 1024;
const PARTIAL_SIZE: u64 = 256 * 1024;
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
const MIN_BUFFER_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Md5,
    Sha256,
}

enum Hasher {
    Md5(md5::Md5),
    Sha256(sha2::Sha256),
}

impl Hasher {
    fn new(kind: HashKind) -> Self {
        match kind {
            HashKind::Md5 => Hasher::Md5(md5::Md5::default()),
            HashKind::Sha256 => Hasher::Sha256(sha2::Sha256::default()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => {
                use md5::Digest;
                h.update(data);
            }
            Hasher::Sha256(h) => {
                use sha2::Digest;
                h.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Md5(h) => {
                use md5::Digest;
                hex::encode(h.finalize())
            }
            Hasher::Sha256(h) => {
                use sha2::Digest;
                hex::encode(h.finalize())
            }
        }
    }
}

/// MD5/SHA-256 content comparator. Both hash kinds share this one
/// implementation, differing only in which hasher they instantiate, exactly
/// as spec.md 4.3 describes them ("identical structure, differing only in
/// hash function").
pub struct HashComparator {
    kind: HashKind,
    buffer_size: usize,
    limiter: Option<Arc<Mutex<RateLimiter>>>,
}

impl HashComparator {
    pub fn new(kind: HashKind) -> Self {
        Self {
            kind,
            buffer_size: DEFAULT_BUFFER_SIZE,
            limiter: None,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
        self
    }

    async fn partial_hash(&self, storage: &(dyn Storage + 'static), path: &str) -> Result<String> {
        let data = storage.read(path, 0, Some(PARTIAL_SIZE)).await?;
        let mut hasher = Hasher::new(self.kind);
        hasher.update(&data);
        Ok(hasher.finalize_hex())
    }

    async fn full_hash(
        &self,
        storage: &(dyn Storage + 'static),
        path: &str,
        total_bytes: u64,
        cancel: &CancellationToken,
        progress: &Option<crate::model::ProgressCallback>,
    ) -> Result<String> {
        let mut hasher = Hasher::new(self.kind);
        let mut offset = 0u64;
        let mut throttle = ProgressThrottle::new(total_bytes);
        loop {
            if cancel.is_cancelled() {
                return Err(crate::error::SyncError::Cancelled);
            }
            let chunk = storage.read(path, offset, Some(self.buffer_size as u64)).await?;
            if chunk.is_empty() {
                break;
            }
            hasher.update(&chunk);
            offset += chunk.len() as u64;
            super::throttle(&self.limiter, chunk.len() as u64, cancel).await;
            throttle.tick(path, offset, progress, false);
        }
        throttle.tick(path, offset, progress, true);
        Ok(hasher.finalize_hex())
    }
}

#[async_trait]
impl Comparator for HashComparator {
    async fn compare(
        &self,
        source: &(dyn Storage + 'static),
        dest: &(dyn Storage + 'static),
        path: &str,
        ctx: &CompareContext<'_>,
    ) -> Comparison {
        if let Some(result) = existence_result(path, ctx.source_info.is_some(), ctx.dest_info.is_some()) {
            return result;
        }
        let (src, dst) = (ctx.source_info.unwrap(), ctx.dest_info.unwrap());
        if src.size != dst.size {
            return Comparison {
                source_path: path.to_string(),
                dest_path: path.to_string(),
                result: ComparisonResult::Different,
                reason: "file sizes differ".to_string(),
                error: None,
            };
        }

        if src.size >= PARTIAL_THRESHOLD {
            let (source_partial, dest_partial) =
                tokio::join!(self.partial_hash(source, path), self.partial_hash(dest, path));
            if let (Ok(a), Ok(b)) = (&source_partial, &dest_partial) {
                if a != b {
                    return Comparison {
                        source_path: path.to_string(),
                        dest_path: path.to_string(),
                        result: ComparisonResult::Different,
                        reason: "partial hash mismatch".to_string(),
                        error: None,
                    };
                }
                // partial hashes agree; fall through to a full hash to confirm.
            }
            // either side's partial read failed; fall back to full hash below
            // rather than failing the comparison outright.
        }

        let (source_full, dest_full) = tokio::join!(
            self.full_hash(source, path, src.size, ctx.cancel, &ctx.progress),
            self.full_hash(dest, path, dst.size, ctx.cancel, &ctx.progress),
        );

        match (source_full, dest_full) {
            (Ok(a), Ok(b)) if a == b => Comparison {
                source_path: path.to_string(),
                dest_path: path.to_string(),
                result: ComparisonResult::Same,
                reason: format!("{} hashes match", self.name()),
                error: None,
            },
            (Ok(_), Ok(_)) => Comparison {
                source_path: path.to_string(),
                dest_path: path.to_string(),
                result: ComparisonResult::Different,
                reason: format!("{} hashes differ", self.name()),
                error: None,
            },
            (Err(e), _) | (_, Err(e)) => Comparison {
                source_path: path.to_string(),
                dest_path: path.to_string(),
                result: ComparisonResult::Error,
                reason: "failed to hash file content".to_string(),
                error: Some(e.to_string()),
            },
        }
    }

    fn set_reader_wrapper(&mut self, limiter: Option<Arc<Mutex<RateLimiter>>>) {
        self.limiter = limiter;
    }

    fn name(&self) -> &'static str {
        match self.kind {
            HashKind::Md5 => "md5",
            HashKind::Sha256 => "sha256",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileInfo;
    use crate::storage::local::LocalStorage;
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn info(relative_path: &str, size: u64) -> FileInfo {
        FileInfo {
            absolute_path: PathBuf::from(relative_path),
            relative_path: relative_path.to_string(),
            size,
            mtime: Utc::now(),
            is_dir: false,
            permissions: 0o644,
        }
    }

    #[tokio::test]
    async fn identical_small_files_are_same() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        storage.write("a.txt", b"hello", Utc::now(), None).await.unwrap();
        storage.write("b.txt", b"hello", Utc::now(), None).await.unwrap();
        let cancel = CancellationToken::new();
        let source = info("a.txt", 5);
        let dest = info("b.txt", 5);
        let ctx = CompareContext {
            source_info: Some(&source),
            dest_info: Some(&dest),
            cancel: &cancel,
            progress: None,
        };
        let cmp = HashComparator::new(HashKind::Sha256);
        let result = cmp.compare(&storage, &storage, "a.txt", &ctx).await;
        assert_eq!(result.result, ComparisonResult::Same);
    }

    #[tokio::test]
    async fn differing_content_same_size_is_different() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        storage.write("a.txt", b"hello", Utc::now(), None).await.unwrap();
        storage.write("b.txt", b"world", Utc::now(), None).await.unwrap();
        let cancel = CancellationToken::new();
        let source = info("a.txt", 5);
        let dest = info("b.txt", 5);
        let ctx = CompareContext {
            source_info: Some(&source),
            dest_info: Some(&dest),
            cancel: &cancel,
            progress: None,
        };
        let cmp = HashComparator::new(HashKind::Md5);
        let result = cmp.compare(&storage, &storage, "a.txt", &ctx).await;
        assert_eq!(result.result, ComparisonResult::Different);
    }

    #[tokio::test]
    async fn partial_hash_rejects_large_mismatched_files_without_full_read() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        let size = (PARTIAL_THRESHOLD + 4096) as usize;
        let mut a = vec![0u8; size];
        let mut b = vec![0u8; size];
        a[0] = 1;
        b[0] = 2;
        storage.write("a.bin", &a, Utc::now(), None).await.unwrap();
        storage.write("b.bin", &b, Utc::now(), None).await.unwrap();
        let cancel = CancellationToken::new();
        let source = info("a.bin", size as u64);
        let dest = info("b.bin", size as u64);
        let ctx = CompareContext {
            source_info: Some(&source),
            dest_info: Some(&dest),
            cancel: &cancel,
            progress: None,
        };
        let cmp = HashComparator::new(HashKind::Sha256);
        let result = cmp.compare(&storage, &storage, "a.bin", &ctx).await;
        assert_eq!(result.result, ComparisonResult::Different);
        assert_eq!(result.reason, "partial hash mismatch");
    }

    #[tokio::test]
    async fn size_mismatch_short_circuits() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        storage.write("a.txt", b"hello", Utc::now(), None).await.unwrap();
        storage.write("b.txt", b"hello!", Utc::now(), None).await.unwrap();
        let cancel = CancellationToken::new();
        let source = info("a.txt", 5);
        let dest = info("b.txt", 6);
        let ctx = CompareContext {
            source_info: Some(&source),
            dest_info: Some(&dest),
            cancel: &cancel,
            progress: None,
        };
        let cmp = HashComparator::new(HashKind::Sha256);
        let result = cmp.compare(&storage, &storage, "a.txt", &ctx).await;
        assert_eq!(result.result, ComparisonResult::Different);
        assert_eq!(result.reason, "file sizes differ");
    }
}
