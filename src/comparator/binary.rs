use super::{existence_result, CompareContext, Comparator, ProgressThrottle};
use crate::model::{Comparison, ComparisonResult};
use crate::ratelimit::RateLimiter;
use crate::storage::Storage;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
const MIN_BUFFER_SIZE: usize = 4 * 1024;

/// Byte-for-byte comparison. Existence and size are checked first; then
/// both sides are streamed one buffer at a time and compared in lockstep.
pub struct BinaryComparator {
    buffer_size: usize,
    limiter: Option<Arc<Mutex<RateLimiter>>>,
}

impl BinaryComparator {
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            limiter: None,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
        self
    }
}

impl Default for BinaryComparator {
    fn default() -> Self {
        Self::new()
    }
}

fn first_mismatch(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter().zip(b.iter()).position(|(x, y)| x != y)
}

#[async_trait]
impl Comparator for BinaryComparator {
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

        let total = src.size;
        let mut throttle = ProgressThrottle::new(total);
        let mut offset = 0u64;

        loop {
            if ctx.cancel.is_cancelled() {
                return Comparison {
                    source_path: path.to_string(),
                    dest_path: path.to_string(),
                    result: ComparisonResult::Error,
                    reason: "comparison cancelled".to_string(),
                    error: Some("cancelled".to_string()),
                };
            }

            let (src_chunk, dst_chunk) = tokio::join!(
                source.read(path, offset, Some(self.buffer_size as u64)),
                dest.read(path, offset, Some(self.buffer_size as u64)),
            );
            let (src_chunk, dst_chunk) = match (src_chunk, dst_chunk) {
                (Ok(a), Ok(b)) => (a, b),
                (Err(e), _) | (_, Err(e)) => {
                    return Comparison {
                        source_path: path.to_string(),
                        dest_path: path.to_string(),
                        result: ComparisonResult::Error,
                        reason: "failed to read file content".to_string(),
                        error: Some(e.to_string()),
                    };
                }
            };

            if let Some(idx) = first_mismatch(&src_chunk, &dst_chunk) {
                return Comparison {
                    source_path: path.to_string(),
                    dest_path: path.to_string(),
                    result: ComparisonResult::Different,
                    reason: format!("content differs at byte offset {}", offset + idx as u64),
                    error: None,
                };
            }

            if src_chunk.len() != dst_chunk.len() {
                let ended_at = offset + src_chunk.len().min(dst_chunk.len()) as u64;
                let shorter_side = if src_chunk.len() < dst_chunk.len() { "source" } else { "destination" };
                return Comparison {
                    source_path: path.to_string(),
                    dest_path: path.to_string(),
                    result: ComparisonResult::Different,
                    reason: format!("{} ended first at byte offset {}", shorter_side, ended_at),
                    error: None,
                };
            }

            let read = src_chunk.len() as u64;
            if read == 0 {
                break;
            }

            offset += read;
            super::throttle(&self.limiter, read, ctx.cancel).await;
            throttle.tick(path, offset, &ctx.progress, false);
        }

        throttle.tick(path, offset, &ctx.progress, true);
        Comparison {
            source_path: path.to_string(),
            dest_path: path.to_string(),
            result: ComparisonResult::Same,
            reason: "content is byte-identical".to_string(),
            error: None,
        }
    }

    fn set_reader_wrapper(&mut self, limiter: Option<Arc<Mutex<RateLimiter>>>) {
        self.limiter = limiter;
    }

    fn name(&self) -> &'static str {
        "binary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
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
    async fn identical_content_is_same() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        storage.write("a.txt", b"identical", Utc::now(), None).await.unwrap();
        storage.write("b.txt", b"identical", Utc::now(), None).await.unwrap();
        let cancel = CancellationToken::new();
        let source = info("a.txt", 9);
        let dest = info("b.txt", 9);
        let ctx = CompareContext {
            source_info: Some(&source),
            dest_info: Some(&dest),
            cancel: &cancel,
            progress: None,
        };
        let cmp = BinaryComparator::new();
        let result = cmp.compare(&storage, &storage, "a.txt", &ctx).await;
        assert_eq!(result.result, ComparisonResult::Same);
    }

    #[tokio::test]
    async fn reports_exact_mismatch_offset() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        storage.write("a.txt", b"aaaaXaaaa", Utc::now(), None).await.unwrap();
        storage.write("b.txt", b"aaaaYaaaa", Utc::now(), None).await.unwrap();
        let cancel = CancellationToken::new();
        let source = info("a.txt", 9);
        let dest = info("b.txt", 9);
        let ctx = CompareContext {
            source_info: Some(&source),
            dest_info: Some(&dest),
            cancel: &cancel,
            progress: None,
        };
        let cmp = BinaryComparator::new();
        let result = cmp.compare(&storage, &storage, "a.txt", &ctx).await;
        assert_eq!(result.result, ComparisonResult::Different);
        assert!(result.reason.contains("byte offset 4"));
    }
}
