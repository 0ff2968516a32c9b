//! Source-path exclusion (spec.md 4.6 phase 2).
//!
//! Adapted from the teacher's rsync-style `FilterEngine`/`FilterRule`: this
//! spec only needs an ordered exclude list (no `+`/`-` include syntax, no
//! `.syignore` file loading), so the include half of that engine is dropped
//! and `should_include`'s first-match-wins scan becomes a simpler
//! any-match-excludes scan, but the basename-vs-full-path-vs-directory glob
//! semantics are kept as-is.

use crate::error::{Result, SyncError};
use std::path::Path;

/// A single exclude glob, classified once at construction the way the
/// teacher's `FilterRule::new` does, so matching never re-parses the
/// pattern string.
#[derive(Debug, Clone)]
struct ExcludeRule {
    pattern: glob::Pattern,
    has_slash: bool,
    is_dir_only: bool,
}

impl ExcludeRule {
    fn new(pattern: &str) -> Result<Self> {
        let is_dir_only = pattern.ends_with('/');
        let pattern_for_glob = if is_dir_only {
            pattern.trim_end_matches('/')
        } else {
            pattern
        };
        let has_slash = pattern_for_glob.contains('/');
        let compiled = glob::Pattern::new(pattern_for_glob).map_err(|e| SyncError::Validation {
            field: "exclude_patterns".to_string(),
            message: format!("invalid glob `{pattern}`: {e}"),
        })?;
        Ok(Self {
            pattern: compiled,
            has_slash,
            is_dir_only,
        })
    }

    fn matches(&self, relative_path: &str) -> bool {
        if self.is_dir_only {
            let dir = self.pattern.as_str();
            relative_path == dir || relative_path.starts_with(&format!("{dir}/"))
        } else if self.has_slash {
            self.pattern.matches(relative_path)
        } else {
            let basename = relative_path.rsplit('/').next().unwrap_or(relative_path);
            self.pattern.matches(basename)
        }
    }
}

/// Ordered set of exclude globs. A path is excluded if *any* rule matches
/// (spec.md 4.6: "if any exclude glob matches").
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    rules: Vec<ExcludeRule>,
}

impl ExcludeFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let rules = patterns.iter().map(|p| ExcludeRule::new(p)).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(relative_path))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[allow(dead_code)]
fn _path_hint(_: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rules_excludes_nothing() {
        let filter = ExcludeFilter::new(&[]).unwrap();
        assert!(!filter.is_excluded("anything.txt"));
    }

    #[test]
    fn basename_pattern_matches_anywhere() {
        let filter = ExcludeFilter::new(&["*.tmp".to_string()]).unwrap();
        assert!(filter.is_excluded("a/b/c.tmp"));
        assert!(!filter.is_excluded("a/b/c.txt"));
    }

    #[test]
    fn slash_pattern_matches_full_path_only() {
        let filter = ExcludeFilter::new(&["build/*.o".to_string()]).unwrap();
        assert!(filter.is_excluded("build/main.o"));
        assert!(!filter.is_excluded("other/main.o"));
    }

    #[test]
    fn directory_pattern_matches_contents() {
        let filter = ExcludeFilter::new(&["node_modules/".to_string()]).unwrap();
        assert!(filter.is_excluded("node_modules"));
        assert!(filter.is_excluded("node_modules/lib/index.js"));
        assert!(!filter.is_excluded("node_modules_backup"));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let err = ExcludeFilter::new(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }
}
