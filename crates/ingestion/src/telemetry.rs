//! Process-wide logging setup.
//!
//! The subscriber is installed at most once per process. Callers get a
//! [`TelemetryHandle`] carrying the run id, which the pipeline uses for its
//! run span and artifact names.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info_span, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

static TELEMETRY: OnceLock<TelemetryHandle> = OnceLock::new();

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
    /// Colour the console output (pretty format only).
    pub ansi: bool,
    /// Plain-text log file, appended to.
    pub log_file: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            ansi: true,
            log_file: None,
        }
    }
}

/// Handle to the observability context of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    run_id: Uuid,
    installed: bool,
}

impl TelemetryHandle {
    /// A handle that installs nothing, for tests and embedding.
    pub fn detached() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            installed: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// First eight hex digits of the run id.
    pub fn short_id(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }

    /// True when this handle installed the global subscriber.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Span covering one ingestion run.
    pub fn run_span(&self) -> Span {
        info_span!("ingest_run", run_id = %self.run_id)
    }
}

/// Install the global subscriber on first call; later calls return the
/// same handle and ignore `config`.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryHandle, TelemetryError> {
    if let Some(handle) = TELEMETRY.get() {
        return Ok(handle.clone());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => parse_filter(&directives)?,
        _ => parse_filter(&config.level)?,
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| TelemetryError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let (pretty, json) = match config.format {
        LogFormat::Pretty => (Some(fmt::layer().with_ansi(config.ansi).with_target(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_target(true))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(file_layer)
        .try_init()
        .map_err(|e| TelemetryError::Install(e.to_string()))?;

    let handle = TelemetryHandle {
        run_id: Uuid::new_v4(),
        installed: true,
    };
    Ok(TELEMETRY.get_or_init(|| handle).clone())
}

fn parse_filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter {
        filter: directives.to_string(),
        message: e.to_string(),
    })
}
