//! Log output for the node
//!
//! Everything goes through `tracing`. Console lines go to stderr so that
//! commands printing TOML or version text on stdout stay machine-readable.
//! An optional log file rolls over on a time schedule.

use std::fs;
use std::path::Path;

use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Target prefix of the library's own events
const CRATE_TARGET: &str = "fedround";

/// Target prefix of the binary's events
const BIN_TARGET: &str = "fedround_node";

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Keeps the background file writer running. Dropping it flushes whatever
/// is still queued, so `main` holds it until exit.
pub struct LogGuards {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber for a `run`
pub fn init_logging(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<LogGuards> {
    let level = effective_level(settings, verbose, quiet);

    let (file, file_guard) = match settings.file.as_deref() {
        Some(log_file) => {
            let (layer, guard) = file_layer(
                log_file,
                settings.max_file_size_mb,
                settings.max_files,
                settings.json_format,
            )?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_env_filter(level)?)
        .with(console_layer(settings.json_format))
        .with(file)
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(
        level = %level,
        file = ?settings.file,
        json = settings.json_format,
        "Logging initialized"
    );

    Ok(LogGuards {
        _file_guard: file_guard,
    })
}

/// `--quiet` beats `-v`, which beats the configured level
fn effective_level(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => parse_level(&settings.level),
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

/// Unknown names fall back to info; config validation reports them first
fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "warning" => Level::WARN,
        other => other.parse().unwrap_or(Level::INFO),
    }
}

fn directive(raw: &str) -> Result<tracing_subscriber::filter::Directive> {
    raw.parse()
        .map_err(|e| Error::Internal(format!("Invalid log directive '{}': {}", raw, e)))
}

/// RUST_LOG (or `level` when unset) for dependencies. Node targets always
/// follow `level`.
fn build_env_filter(level: Level) -> Result<EnvFilter> {
    let level = level.to_string().to_lowercase();

    Ok(EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&level))
        .add_directive(directive(&format!("{}={}", CRATE_TARGET, level))?)
        .add_directive(directive(&format!("{}={}", BIN_TARGET, level))?))
}

/// One fmt layer. `detailed` adds thread ids and source locations.
fn fmt_layer<S, W>(writer: W, json: bool, detailed: bool, ansi: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(detailed)
        .with_file(detailed)
        .with_line_number(detailed)
        .with_ansi(ansi);

    if json {
        Box::new(layer.json().with_span_events(FmtSpan::CLOSE))
    } else if detailed {
        Box::new(layer)
    } else {
        Box::new(layer.compact())
    }
}

fn console_layer<S>(json: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    // JSON consumers want the same detail as the file
    fmt_layer(std::io::stderr, json, json, !json)
}

/// Non-blocking rolling file layer. The returned guard must outlive the
/// subscriber.
fn file_layer<S>(
    log_file: &str,
    max_size_mb: u64,
    max_files: u32,
    json: bool,
) -> Result<(BoxedLayer<S>, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let path = Path::new(log_file);
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory).map_err(|e| Error::IoWrite {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("node.log");

    // No size-based rolling in tracing-appender; small budgets roll hourly
    let rotation = match max_size_mb {
        1..=9 => Rotation::HOURLY,
        _ => Rotation::DAILY,
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(max_files.max(1) as usize)
        .build(directory)
        .map_err(|e| Error::Internal(format!("Failed to create log file appender: {}", e)))?;

    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((fmt_layer(writer, json, true, false), guard))
}

/// Stderr logging for short-lived subcommands. Does nothing when a
/// subscriber is already installed.
pub fn init_simple(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
