/// Structured logging for the drought service
///
/// One `ServiceLogger` is built in `main` from the `[logging]` table and
/// handed to each orchestrator as `&dyn log::Log`. Records carry the data
/// source in their target (`WAMIS`, `DB`, `PROC`, `SYS`); per-entity
/// messages start with the entity or region code in brackets.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::config::LoggingConfig;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Data Source Tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Wamis,
    Database,
    Processor,
    System,
}

impl DataSource {
    /// Tag used as the `log` record target.
    pub const fn target(self) -> &'static str {
        match self {
            DataSource::Wamis => "WAMIS",
            DataSource::Database => "DB",
            DataSource::Processor => "PROC",
            DataSource::System => "SYS",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target())
    }
}

pub const WAMIS: &str = DataSource::Wamis.target();
pub const DB: &str = DataSource::Database.target();
pub const PROC: &str = DataSource::Processor.target();
pub const SYS: &str = DataSource::System.target();

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub struct ServiceLogger {
    min_level: LevelFilter,
    /// Mirror of every emitted line, when configured.
    file: Option<Mutex<File>>,
    /// Prefix console lines with a UTC timestamp.
    console_timestamps: bool,
}

impl ServiceLogger {
    pub fn new(min_level: LevelFilter, log_file: Option<&str>, console_timestamps: bool) -> Result<Self> {
        let file = match log_file {
            Some(path) => Some(Mutex::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| PipelineError::Io { path: path.to_string(), source })?,
            )),
            None => None,
        };
        Ok(Self { min_level, file, console_timestamps })
    }

    pub fn from_config(config: &LoggingConfig) -> Result<Self> {
        let level = LevelFilter::from_str(&config.level)
            .map_err(|_| PipelineError::Config(format!("unknown log level '{}'", config.level)))?;
        Self::new(level, config.file.as_deref(), config.timestamps)
    }

    /// `<LEVEL> <TARGET>: <message>`, the shared body of console and file lines.
    fn body(record: &Record) -> String {
        format!("{} {}: {}", level_label(record.level()), record.target(), record.args())
    }
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

impl Log for ServiceLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let body = Self::body(record);
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

        if self.console_timestamps {
            match record.level() {
                Level::Error | Level::Warn => eprintln!("{} {}", timestamp, body),
                _ => println!("{} {}", timestamp, body),
            }
        } else {
            match record.level() {
                Level::Error => eprintln!("   ✗ {}: {}", record.target(), record.args()),
                Level::Warn => eprintln!("   ⚠ {}: {}", record.target(), record.args()),
                _ => println!("   {}", record.args()),
            }
        }

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                if let Err(e) = writeln!(file, "{} {}", timestamp, body) {
                    eprintln!("Failed to write to log file: {}", e);
                }
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}
