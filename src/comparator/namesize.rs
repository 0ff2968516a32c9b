use super::{existence_result, CompareContext, Comparator};
use crate::model::{Comparison, ComparisonResult};
use crate::storage::Storage;
use async_trait::async_trait;

/// Compares basename equality then size only. Never touches file content.
#[derive(Default)]
pub struct NameSizeComparator;

#[async_trait]
impl Comparator for NameSizeComparator {
    async fn compare(
        &self,
        _source: &(dyn Storage + 'static),
        _dest: &(dyn Storage + 'static),
        path: &str,
        ctx: &CompareContext<'_>,
    ) -> Comparison {
        if let Some(result) = existence_result(path, ctx.source_info.is_some(), ctx.dest_info.is_some()) {
            return result;
        }
        let (src, dst) = (ctx.source_info.unwrap(), ctx.dest_info.unwrap());
        let basename_src = src.relative_path.rsplit('/').next().unwrap_or(&src.relative_path);
        let basename_dst = dst.relative_path.rsplit('/').next().unwrap_or(&dst.relative_path);

        let result = if basename_src == basename_dst && src.size == dst.size {
            ComparisonResult::Same
        } else {
            ComparisonResult::Different
        };
        Comparison {
            source_path: path.to_string(),
            dest_path: path.to_string(),
            reason: if result == ComparisonResult::Same {
                "name and size match".to_string()
            } else {
                "name or size differs".to_string()
            },
            result,
            error: None,
        }
    }

    fn name(&self) -> &'static str {
        "namesize"
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
    async fn same_name_and_size_matches() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        let cancel = CancellationToken::new();
        let source = info("a.txt", 10);
        let dest = info("a.txt", 10);
        let ctx = CompareContext {
            source_info: Some(&source),
            dest_info: Some(&dest),
            cancel: &cancel,
            progress: None,
        };
        let cmp = NameSizeComparator;
        let result = cmp.compare(&storage, &storage, "a.txt", &ctx).await;
        assert_eq!(result.result, ComparisonResult::Same);
    }

    #[tokio::test]
    async fn different_size_is_different() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        let cancel = CancellationToken::new();
        let source = info("a.txt", 10);
        let dest = info("a.txt", 11);
        let ctx = CompareContext {
            source_info: Some(&source),
            dest_info: Some(&dest),
            cancel: &cancel,
            progress: None,
        };
        let cmp = NameSizeComparator;
        let result = cmp.compare(&storage, &storage, "a.txt", &ctx).await;
        assert_eq!(result.result, ComparisonResult::Different);
    }

    #[tokio::test]
    async fn source_only_when_dest_missing() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        let cancel = CancellationToken::new();
        let source = info("a.txt", 10);
        let ctx = CompareContext {
            source_info: Some(&source),
            dest_info: None,
            cancel: &cancel,
            progress: None,
        };
        let cmp = NameSizeComparator;
        let result = cmp.compare(&storage, &storage, "a.txt", &ctx).await;
        assert_eq!(result.result, ComparisonResult::SourceOnly);
    }
}
