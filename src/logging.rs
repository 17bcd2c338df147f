//! Structured logging and tracing for keba-control
//!
//! Console and rolling-file output through the tracing ecosystem, plus the
//! [`StructuredLogger`] used by components to attach station context.

use crate::config::LoggingConfig;
use crate::error::{KebaError, Result};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use tracing::{Level, Subscriber, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod level;
mod structured;

pub use level::{level_rank, min_level, parse_log_level};
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

/// Disables the file appender when set (useful on read-only systems)
pub const DISABLE_FILE_LOG_ENV: &str = "KEBA_DISABLE_FILE_LOG";

// Outcome of the one and only initialization attempt
static INIT: OnceCell<std::result::Result<(), String>> = OnceCell::new();
// Flushes the file writer; must live as long as the process
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Per-sink levels resolved from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LevelPlan {
    console: Level,
    file: Level,
}

impl LevelPlan {
    fn from_config(config: &LoggingConfig) -> Result<Self> {
        let base = parse_log_level(&config.level)?;
        // Bad overrides fall back to the base level instead of failing startup
        let resolve = |value: &Option<String>| {
            value
                .as_deref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base)
        };
        Ok(Self {
            console: resolve(&config.console_level),
            file: resolve(&config.file_level),
        })
    }

    fn filter(&self) -> EnvFilter {
        let level = min_level(self.console, self.file);
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("keba_control={},tower_http=warn", level).into())
    }
}

/// Initialize logging from configuration.
///
/// Only the first call installs a subscriber; later calls report the result
/// of that first attempt.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT.get_or_init(|| install(config).map_err(|e| e.to_string()))
        .clone()
        .map_err(KebaError::config)
}

fn install(config: &LoggingConfig) -> Result<()> {
    let levels = LevelPlan::from_config(config)?;
    let registry = tracing_subscriber::registry().with(levels.filter());

    if file_logging_disabled() {
        registry
            .with(output_layer(std::io::stdout, config.json_format, levels.console))
            .init();
        info!("Logging initialized - console only at {:?}", levels.console);
        return Ok(());
    }

    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("keba-control")
        .filename_suffix("log")
        .max_log_files(config.backup_count.max(1) as usize)
        .build(log_directory(&config.file))
        .map_err(|e| KebaError::io(format!("Failed to create log file appender: {}", e)))?;
    let (writer, guard) = non_blocking(appender);
    let _ = FILE_GUARD.set(guard);

    let console = config
        .console_output
        .then(|| output_layer(std::io::stdout, config.json_format, levels.console));
    registry
        .with(output_layer(writer, config.json_format, levels.file))
        .with(console)
        .init();

    info!(
        "Logging initialized - console: {}, file: {:?} in {}",
        if config.console_output {
            format!("{:?}", levels.console)
        } else {
            "off".to_string()
        },
        levels.file,
        log_directory(&config.file).display()
    );
    Ok(())
}

fn file_logging_disabled() -> bool {
    cfg!(test) || std::env::var_os(DISABLE_FILE_LOG_ENV).is_some()
}

/// Directory the rolling appender writes into; a path with an extension
/// names a file, so its parent is used.
fn log_directory(file: &str) -> PathBuf {
    let path = Path::new(file);
    match path.parent() {
        Some(parent) if path.extension().is_some() => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

fn output_layer<S, W>(writer: W, json: bool, level: Level) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    let filter = LevelFilter::from_level(level);
    if json {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    }
}
