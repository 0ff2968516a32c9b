use super::{existence_result, CompareContext, Comparator};
use crate::model::{Comparison, ComparisonResult};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;

/// One-second tolerance for filesystem mtime granularity differences
/// across platforms (spec.md 4.3).
const MTIME_TOLERANCE_SECS: i64 = 1;

/// NameSize, then `mtime`. Asymmetric by design: a dest that is newer than
/// source is treated as `Same` because the one-way pipeline would not copy
/// in that case anyway.
#[derive(Default)]
pub struct TimestampComparator;

#[async_trait]
impl Comparator for TimestampComparator {
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

        if basename_src != basename_dst || src.size != dst.size {
            return Comparison {
                source_path: path.to_string(),
                dest_path: path.to_string(),
                result: ComparisonResult::Different,
                reason: "name or size differs".to_string(),
                error: None,
            };
        }

        let tolerance = ChronoDuration::seconds(MTIME_TOLERANCE_SECS);
        let source_newer = src.mtime > dst.mtime + tolerance;

        let (result, reason) = if source_newer {
            (ComparisonResult::Different, "source is newer than destination".to_string())
        } else {
            (ComparisonResult::Same, "destination is not older than source".to_string())
        };

        Comparison {
            source_path: path.to_string(),
            dest_path: path.to_string(),
            result,
            reason,
            error: None,
        }
    }

    fn name(&self) -> &'static str {
        "timestamp"
    }
}
