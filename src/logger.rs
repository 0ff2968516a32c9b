//! Per-run structured audit log (SPEC_FULL.md component C9).
//!
//! Independent of the `tracing`/`tracing-subscriber` developer diagnostics
//! wired up in `main.rs` (the teacher's idiom for stderr diagnostics): this
//! is the pipeline's own audit trail, written regardless of what the CLI's
//! verbosity flags are set to.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

pub trait Logger: Send + Sync {
    fn debug(&self, message: &str, fields: &[(&str, &str)]);
    fn info(&self, message: &str, fields: &[(&str, &str)]);
    fn warn(&self, message: &str, fields: &[(&str, &str)]);
    fn error(&self, message: &str, fields: &[(&str, &str)]);
    fn close(&self) {}
}

/// Satisfies the interface for "disabled".
#[derive(Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn debug(&self, _message: &str, _fields: &[(&str, &str)]) {}
    fn info(&self, _message: &str, _fields: &[(&str, &str)]) {}
    fn warn(&self, _message: &str, _fields: &[(&str, &str)]) {}
    fn error(&self, _message: &str, _fields: &[(&str, &str)]) {}
}

struct FileLoggerState {
    path: PathBuf,
    file: std::fs::File,
    size: u64,
}

/// Appends line-delimited records (text or JSON), gated by a minimum level,
/// rotating to `path.1`..`path.N` once `max_size` bytes is exceeded and
/// discarding the oldest backup (spec.md 4.9).
pub struct FileLogger {
    min_level: LogLevel,
    format: LogFormat,
    max_size: u64,
    max_backups: u32,
    state: Mutex<FileLoggerState>,
}

impl FileLogger {
    pub fn new(path: impl Into<PathBuf>, min_level: LogLevel, format: LogFormat, max_size: u64, max_backups: u32) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            min_level,
            format,
            max_size,
            max_backups,
            state: Mutex::new(FileLoggerState { path, file, size }),
        })
    }

    fn rotate(state: &mut FileLoggerState, max_backups: u32) -> std::io::Result<()> {
        for i in (1..max_backups).rev() {
            let from = backup_path(&state.path, i);
            let to = backup_path(&state.path, i + 1);
            if from.exists() {
                let _ = fs::rename(&from, &to);
            }
        }
        if max_backups > 0 {
            let _ = fs::rename(&state.path, backup_path(&state.path, 1));
        }
        state.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&state.path)?;
        state.size = 0;
        Ok(())
    }

    fn write_record(&self, level: LogLevel, message: &str, fields: &[(&str, &str)]) {
        if level < self.min_level {
            return;
        }
        let line = match self.format {
            LogFormat::Text => {
                let mut line = format!("[{}] {}", level.as_str(), message);
                for (k, v) in fields {
                    line.push_str(&format!(" {k}={v}"));
                }
                line.push('\n');
                line
            }
            LogFormat::Json => {
                let fields_obj: serde_json::Map<String, serde_json::Value> = fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                    .collect();
                let record = serde_json::json!({
                    "level": level.as_str(),
                    "message": message,
                    "fields": fields_obj,
                });
                format!("{record}\n")
            }
        };

        let mut state = self.state.lock().expect("log mutex poisoned");
        if state.size + line.len() as u64 > self.max_size && self.max_size > 0 {
            if let Err(e) = Self::rotate(&mut state, self.max_backups) {
                eprintln!("syncnorris: failed to rotate log file: {e}");
            }
        }
        if let Err(e) = state.file.write_all(line.as_bytes()) {
            eprintln!("syncnorris: failed to write log record: {e}");
            return;
        }
        state.size += line.len() as u64;
    }
}

fn backup_path(base: &Path, index: u32) -> PathBuf {
    let mut os = base.as_os_str().to_owned();
    os.push(format!(".{index}"));
    PathBuf::from(os)
}

impl Logger for FileLogger {
    fn debug(&self, message: &str, fields: &[(&str, &str)]) {
        self.write_record(LogLevel::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: &[(&str, &str)]) {
        self.write_record(LogLevel::Info, message, fields);
    }

    fn warn(&self, message: &str, fields: &[(&str, &str)]) {
        self.write_record(LogLevel::Warn, message, fields);
    }

    fn error(&self, message: &str, fields: &[(&str, &str)]) {
        self.write_record(LogLevel::Error, message, fields);
    }

    fn close(&self) {
        let mut state = self.state.lock().expect("log mutex poisoned");
        let _ = state.file.flush();
    }
}
