//! CLI argument surface (SPEC_FULL.md A1). Built with `clap` derive macros
//! the way the teacher's `cli.rs` does — short+long flags, `ArgAction::Count`
//! for `-v`/`-vv` — generalized to this spec's `sync`/`compare`/`config`/
//! `version` subcommands (spec.md section 6).

use crate::model::{ComparisonMethod, ConflictResolution, SyncMode};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "syncnorris")]
#[command(about = "Cross-platform folder synchronization engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only show errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile destination with source (or both, in bidirectional mode)
    Sync(SyncArgs),
    /// Dry-run a sync and always report differences
    Compare(SyncArgs),
    /// Inspect or scaffold the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print version information
    Version {
        /// Print only the version number
        #[arg(long)]
        short: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init,
}

#[derive(Parser, Debug, Clone)]
pub struct SyncArgs {
    /// Source directory
    #[arg(long)]
    pub source: PathBuf,

    /// Destination directory
    #[arg(long)]
    pub dest: PathBuf,

    #[arg(long, value_enum, default_value_t = CliSyncMode::Oneway)]
    pub mode: CliSyncMode,

    #[arg(long, value_enum, default_value_t = CliComparisonMethod::Hash)]
    pub comparison: CliComparisonMethod,

    #[arg(long = "conflict", value_enum, default_value_t = CliConflictResolution::Newer)]
    pub conflict: CliConflictResolution,

    /// Show what would change without touching either tree
    #[arg(long)]
    pub dry_run: bool,

    /// Create the destination root if it does not already exist
    #[arg(long)]
    pub create_dest: bool,

    /// Remove destination-only files absent from the source
    #[arg(long)]
    pub delete: bool,

    /// Number of parallel workers
    #[arg(long, default_value_t = 5)]
    pub parallel: usize,

    /// Bandwidth limit for reads, e.g. `10M`, `512K` (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub bandwidth: String,

    /// Glob pattern to exclude (repeatable)
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    #[arg(long, value_enum, default_value_t = CliOutputFormat::Human)]
    pub output: CliOutputFormat,

    /// Write the structured differences list to this path
    #[arg(long)]
    pub diff_report: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CliOutputFormat::Human)]
    pub diff_format: CliOutputFormat,

    /// Persist per-file fingerprints for bidirectional change detection
    #[arg(long)]
    pub stateful: bool,

    /// Append structured run events to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CliLogFormat::Text)]
    pub log_format: CliLogFormat,

    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    pub log_level: CliLogLevel,

    /// Read buffer size in bytes
    #[arg(long, default_value_t = 65536)]
    pub buffer_size: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliSyncMode {
    Oneway,
    Bidirectional,
}

impl From<CliSyncMode> for SyncMode {
    fn from(value: CliSyncMode) -> Self {
        match value {
            CliSyncMode::Oneway => SyncMode::OneWay,
            CliSyncMode::Bidirectional => SyncMode::Bidirectional,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliComparisonMethod {
    Namesize,
    Timestamp,
    Md5,
    Hash,
    Binary,
}

impl From<CliComparisonMethod> for ComparisonMethod {
    fn from(value: CliComparisonMethod) -> Self {
        match value {
            CliComparisonMethod::Namesize => ComparisonMethod::NameSize,
            CliComparisonMethod::Timestamp => ComparisonMethod::Timestamp,
            CliComparisonMethod::Md5 => ComparisonMethod::Md5,
            CliComparisonMethod::Hash => ComparisonMethod::Sha256,
            CliComparisonMethod::Binary => ComparisonMethod::Binary,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliConflictResolution {
    SourceWins,
    DestWins,
    Newer,
    Both,
}

impl From<CliConflictResolution> for ConflictResolution {
    fn from(value: CliConflictResolution) -> Self {
        match value {
            CliConflictResolution::SourceWins => ConflictResolution::SourceWins,
            CliConflictResolution::DestWins => ConflictResolution::DestWins,
            CliConflictResolution::Newer => ConflictResolution::Newer,
            CliConflictResolution::Both => ConflictResolution::Both,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliOutputFormat {
    Human,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliLogFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// `default_value_t` renders its default through `Display`, so every
/// `ValueEnum` used that way gets one that defers to its possible-value
/// name, the pattern clap's own derive examples use.
macro_rules! display_via_value_enum {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    self.to_possible_value()
                        .expect("no skipped ValueEnum variants")
                        .get_name()
                        .fmt(f)
                }
            }
        )+
    };
}

display_via_value_enum!(
    CliSyncMode,
    CliComparisonMethod,
    CliConflictResolution,
    CliOutputFormat,
    CliLogFormat,
    CliLogLevel,
);

impl From<CliLogFormat> for crate::logger::LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Text => crate::logger::LogFormat::Text,
            CliLogFormat::Json => crate::logger::LogFormat::Json,
        }
    }
}

impl From<CliLogLevel> for crate::logger::LogLevel {
    fn from(value: CliLogLevel) -> Self {
        match value {
            CliLogLevel::Debug => crate::logger::LogLevel::Debug,
            CliLogLevel::Info => crate::logger::LogLevel::Info,
            CliLogLevel::Warn => crate::logger::LogLevel::Warn,
            CliLogLevel::Error => crate::logger::LogLevel::Error,
        }
    }
}

impl SyncArgs {
    /// Fail-fast validation class from spec.md section 7: source must
    /// exist, source/dest must not be nested, destination must either
    /// exist or `--create-dest` must be given. Mirrors the teacher's
    /// `Cli::validate` returning a pre-flight `anyhow::Result<()>` before
    /// any backend is touched.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.source.exists() {
            anyhow::bail!("source path does not exist: {}", self.source.display());
        }
        if !self.source.is_dir() {
            anyhow::bail!("source must be a directory: {}", self.source.display());
        }
        if !self.dest.exists() && !self.create_dest {
            anyhow::bail!(
                "destination path does not exist: {}\nuse --create-dest to create it",
                self.dest.display()
            );
        }
        let source = self.source.canonicalize().unwrap_or_else(|_| self.source.clone());
        let dest = self.dest.canonicalize().unwrap_or_else(|_| self.dest.clone());
        if source == dest || source.starts_with(&dest) || dest.starts_with(&source) {
            anyhow::bail!("source and destination must not be nested");
        }
        Ok(())
    }

    pub fn bandwidth_bytes_per_sec(&self) -> anyhow::Result<u64> {
        parse_size(&self.bandwidth)
    }
}

/// Parses a decimal-multiplier byte size (`K`/`M`/`G` = 1000/1e6/1e9),
/// matching spec.md section 6's bandwidth unit contract. Decimal rather
/// than the teacher's binary `parse_size` helper, per spec.
pub fn parse_size(input: &str) -> anyhow::Result<u64> {
    let input = input.trim();
    if let Some(stripped) = input.strip_suffix(['K', 'k']) {
        return Ok(stripped.trim().parse::<u64>()? * 1_000);
    }
    if let Some(stripped) = input.strip_suffix(['M', 'm']) {
        return Ok(stripped.trim().parse::<u64>()? * 1_000_000);
    }
    if let Some(stripped) = input.strip_suffix(['G', 'g']) {
        return Ok(stripped.trim().parse::<u64>()? * 1_000_000_000);
    }
    Ok(input.parse::<u64>()?)
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_suffixes() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("512K").unwrap(), 512_000);
        assert_eq!(parse_size("10M").unwrap(), 10_000_000);
        assert_eq!(parse_size("2G").unwrap(), 2_000_000_000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_size("not-a-size").is_err());
    }
}
