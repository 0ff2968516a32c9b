//! Configuration file loading (SPEC_FULL.md A2).
//!
//! A platform-appropriate TOML document (`dirs::config_dir()`, matching the
//! teacher's `dirs` dependency) holding the four sections spec.md section 6
//! names, plus a top-level `exclude` list. CLI flags always take precedence:
//! `Config` fields are all optional and are overlaid onto already-parsed CLI
//! values rather than modeled as named presets/profiles (the teacher's
//! `Config::get_profile` mechanism is an out-of-scope CLI nicety, not part
//! of the specified core).

use crate::model::{ComparisonMethod, ConflictResolution, SyncMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncSection,
    pub performance: PerformanceSection,
    pub output: OutputSection,
    pub logging: LoggingSection,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub mode: Option<SyncMode>,
    pub comparison: Option<ComparisonMethod>,
    pub conflict_resolution: Option<ConflictResolution>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSection {
    pub max_workers: Option<usize>,
    pub buffer_size: Option<usize>,
    pub bandwidth_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub format: Option<String>,
    pub progress: Option<bool>,
    pub quiet: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub format: Option<String>,
    pub level: Option<String>,
}

impl Config {
    /// `<config_dir>/syncnorris/config.toml`, mirroring the teacher's
    /// `Config::config_path` location scheme.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
        Ok(base.join("syncnorris").join("config.toml"))
    }

    /// Missing file is an empty (all-defaults) config, not an error, the
    /// same "absence is fine" contract the sync-state store uses.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        match std::fs::read_to_string(&path) {
            Ok(body) => Ok(toml::from_str(&body)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_default(path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = toml::to_string_pretty(&Config::default())?;
        std::fs::write(path, body)?;
        Ok(())
    }
}
