//! tracing setup for the CLI
//!
//! Records always go to stderr so the refined answer on stdout stays
//! pipeable. A log file under `log_dir` is added unless the caller asks for
//! console output only.

use crate::config::AppConfig;
use crate::error::DocRefineError;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file name inside the configured log directory
pub const LOG_FILE_NAME: &str = "docrefine.log";

/// HTTP internals that drown out refine progress at debug level
const QUIET_TARGETS: &[&str] = &["hyper", "reqwest", "h2"];

/// Where log records go besides stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    /// Console plus an append-only file at this path
    File(PathBuf),
}

impl LogOutput {
    pub fn from_config(config: &AppConfig, console_only: bool) -> Self {
        if console_only {
            LogOutput::Console
        } else {
            LogOutput::File(config.get_log_path(LOG_FILE_NAME))
        }
    }

    pub fn file(&self) -> Option<&Path> {
        match self {
            LogOutput::Console => None,
            LogOutput::File(path) => Some(path.as_path()),
        }
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, replaces the
/// configured level entirely. Returns the filter directive in effect.
pub fn init(config: &AppConfig, output: &LogOutput) -> Result<String, DocRefineError> {
    let directive = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| filter_directive(parse_log_level(&config.log_level)));
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| DocRefineError::config(format!("Invalid log filter '{}': {}", directive, e)))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let file_layer = match output.file() {
        Some(path) => Some(
            fmt::layer()
                .with_writer(Arc::new(open_log_file(path)?))
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| DocRefineError::config(format!("Failed to initialize logging: {}", e)))?;

    match output.file() {
        Some(path) => tracing::info!("Logging to stderr and {} ({})", path.display(), directive),
        None => tracing::info!("Logging to stderr ({})", directive),
    }

    Ok(directive)
}

/// Filter directive for a level, keeping HTTP internals at `warn` or quieter
pub fn filter_directive(level: Level) -> String {
    let quiet = if level < Level::WARN { level } else { Level::WARN };
    let mut directive = level.to_string().to_lowercase();
    for target in QUIET_TARGETS {
        directive.push_str(&format!(",{}={}", target, quiet.to_string().to_lowercase()));
    }
    directive
}

/// Parse a configured level; unknown values fall back to `info`
pub fn parse_log_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Level::WARN,
        other => other.parse::<Level>().unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', defaulting to INFO", level);
            Level::INFO
        }),
    }
}

fn open_log_file(path: &Path) -> Result<File, DocRefineError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            DocRefineError::config(format!("Failed to create log directory {}: {}", dir.display(), e))
        })?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| DocRefineError::config(format!("Failed to open log file {}: {}", path.display(), e)))
}
