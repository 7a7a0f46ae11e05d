//! Logging bootstrap for hosts embedding the reader.
//!
//! One `tracing` registry carries every record the session emits (`session`, `selection`,
//! `store::gateway`, `position::index`, `keymap` targets) plus `log` records forwarded from
//! engine bindings. Records go to a rolling file next to the reader's stored state and,
//! optionally, to stderr. Call [`init`] once on startup; later calls return the first handle.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, util::SubscriberInitExt};

use crate::config::{ReaderConfig, default_data_dir};

/// Environment variables consulted for a filter directive, first match wins.
pub const FILTER_ENV_VARS: [&str; 2] = ["EPUB_READER_LOG", "RUST_LOG"];

pub use tracing_subscriber::filter::LevelFilter as LogLevel;

static LOG_HANDLE: OnceLock<LogHandle> = OnceLock::new();

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LogRolling {
    Hourly,
    Daily,
    Never,
}

impl From<LogRolling> for Rotation {
    fn from(rolling: LogRolling) -> Self {
        match rolling {
            LogRolling::Hourly => Rotation::HOURLY,
            LogRolling::Daily => Rotation::DAILY,
            LogRolling::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    /// Rolled files kept on disk; older ones are deleted by the appender. `None` keeps all.
    pub max_files: Option<usize>,
    pub rolling: LogRolling,
    pub file_level: LevelFilter,
    /// Stderr sink level. `None` for hosts without a console, such as webview shells.
    pub console_level: Option<LevelFilter>,
    /// Forward `log` crate records into `tracing`.
    pub capture_log: bool,
    /// Filter directive such as `session=debug,store::gateway=trace`. Takes precedence over
    /// [`FILTER_ENV_VARS`].
    pub directive: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: default_data_dir().with_file_name("logs"),
            file_prefix: "reader".to_string(),
            max_files: Some(7),
            rolling: LogRolling::Daily,
            file_level: LevelFilter::DEBUG,
            console_level: Some(if cfg!(debug_assertions) {
                LevelFilter::INFO
            } else {
                LevelFilter::WARN
            }),
            capture_log: true,
            directive: None,
        }
    }
}

impl LogConfig {
    /// Keep logs beside the session's file store, so resetting a profile directory takes its
    /// logs along.
    pub fn for_reader(config: &ReaderConfig) -> Self {
        Self { directory: config.resolved_storage_dir().join("logs"), ..Self::default() }
    }

    pub fn with_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.directory = path.into();
        self
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_directive<S: Into<String>>(mut self, directive: S) -> Self {
        self.directive = Some(directive.into());
        self
    }

    pub fn without_console(mut self) -> Self {
        self.console_level = None;
        self
    }
}

/// Keeps the non-blocking file writer alive and records what was installed.
#[derive(Debug)]
pub struct LogHandle {
    _guard: WorkerGuard,
    directory: PathBuf,
    directive: String,
}

impl LogHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Filter directive in effect.
    pub fn directive(&self) -> &str {
        &self.directive
    }
}

/// Install the global subscriber. The first call wins.
pub fn init(config: LogConfig) -> Result<&'static LogHandle> {
    if let Some(handle) = LOG_HANDLE.get() {
        return Ok(handle);
    }

    let handle = install(config)?;
    let _ = LOG_HANDLE.set(handle);
    LOG_HANDLE.get().context("log handle missing after initialisation")
}

fn install(config: LogConfig) -> Result<LogHandle> {
    if config.capture_log {
        let widest = config.console_level.map_or(config.file_level, |c| c.max(config.file_level));
        let _ = tracing_log::LogTracer::builder().with_max_level(bridge_level(widest)).init();
    }

    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("creating log directory at {}", config.directory.display()))?;

    let mut appender = RollingBuilder::new()
        .rotation(config.rolling.into())
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log");
    if let Some(max_files) = config.max_files.filter(|n| *n > 0) {
        appender = appender.max_log_files(max_files);
    }
    let appender = appender.build(&config.directory).context("creating rolling log appender")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let env_directive = FILTER_ENV_VARS.iter().find_map(|var| std::env::var(var).ok());
    let directive = resolve_directive(config.directive.as_deref(), env_directive.as_deref());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("parsing log filter directive {directive:?}"))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true)
        .with_line_number(true)
        .with_filter(config.file_level);
    let console_layer = config.console_level.map(|level| {
        tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(level)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;

    tracing::info!(target: "session", directory = %config.directory.display(), %directive, "logging ready");
    Ok(LogHandle { _guard: guard, directory: config.directory, directive })
}

/// Explicit directive, then the environment, then a build-dependent default. Blank values
/// count as unset.
fn resolve_directive(explicit: Option<&str>, env: Option<&str>) -> String {
    let usable = |value: &&str| !value.trim().is_empty();
    explicit
        .filter(usable)
        .or_else(|| env.filter(usable))
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| if cfg!(debug_assertions) { "debug" } else { "info" }.to_string())
}

fn bridge_level(level: LevelFilter) -> log::LevelFilter {
    // Level names match across both crates; `log` parses them case-insensitively.
    level.to_string().parse().unwrap_or(log::LevelFilter::Trace)
}
