//! Process and worker logging
//!
//! Two kinds of log output are used by the GKDB tools:
//!
//! - A **process logger**, installed once with [`init_logging`], which writes
//!   to the console, a daily rotating file, or both.
//! - **Worker log sinks** ([`WorkerLogSink`]), one plain-text file per worker
//!   named `<location><prefix>_<runTimestamp>_<pid>_<label>.log`. The label is
//!   the worker's partition index, prefixed by its parent's label for nested
//!   workers (`1.3.0`), so it is unique within the process. A worker
//!   runs with the sink's [`Dispatch`] as its scoped default, so concurrent
//!   workers never write into each other's files.
//!
//! Library code logs through the `tracing` macros only, never `println!`.
//!
//! # Example
//!
//! ```no_run
//! use gkdb_common::logging::{LogConfig, init_logging};
//! use tracing::info;
//!
//! fn main() -> gkdb_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!
//!     info!("Application started");
//!     Ok(())
//! }
//! ```

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{Dispatch, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Format of the run timestamp shared by every worker log of one run
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Prefix of the environment variables read by [`LogConfig::merge_env`]
pub const ENV_PREFIX: &str = "GKDB_LOG_";

fn invalid(what: &str, value: &str) -> CommonError {
    CommonError::Config(format!("Invalid log {}: {}", what, value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let level = match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => return Err(invalid("level", s)),
        };
        Ok(level)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the process logger writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn to_console(self) -> bool {
        self != LogOutput::File
    }

    fn to_file(self) -> bool {
        self != LogOutput::Console
    }
}

impl std::str::FromStr for LogOutput {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let output = match s.to_lowercase().as_str() {
            "console" | "stdout" => LogOutput::Console,
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => return Err(invalid("output", s)),
        };
        Ok(output)
    }
}

/// Line format of the process logger; worker logs are always text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(invalid("format", s)),
        }
    }
}

/// Process logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,

    /// Directory of the rotating process log, used when `output` includes a file
    pub log_dir: PathBuf,

    /// Process log file name prefix (`gkdb-ingest` -> `gkdb-ingest.2024-01-18`)
    pub log_file_prefix: String,

    /// Extra `EnvFilter` directives, comma separated (e.g. `scylla=warn`)
    pub filter_directives: Option<String>,

    /// Colour console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "gkdb".to_string(),
            filter_directives: None,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Defaults with `GKDB_LOG_*` overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Apply `GKDB_LOG_*` overrides on top of this configuration
    ///
    /// `LEVEL`, `OUTPUT`, `FORMAT`, `DIR`, `FILE_PREFIX`, `FILTER` and
    /// `ANSI` (true/false) are read.
    pub fn merge_env(self) -> Result<Self> {
        self.apply_overrides(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(level) = lookup("LEVEL") {
            self.level = level.parse()?;
        }
        if let Some(output) = lookup("OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = lookup("FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = lookup("DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = lookup("FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }
        if let Some(filter) = lookup("FILTER") {
            self.filter_directives = Some(filter);
        }
        if let Some(ansi) = lookup("ANSI") {
            self.ansi = ansi.parse().map_err(|_| invalid("ansi flag", &ansi))?;
        }
        Ok(self)
    }

    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    pub fn ansi(mut self, ansi: bool) -> Self {
        self.config.ansi = ansi;
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn env_filter(config: &LogConfig) -> Result<EnvFilter> {
    let mut filter =
        EnvFilter::from_default_env().add_directive(config.level.to_tracing_level().into());
    let extra = config.filter_directives.as_deref().unwrap_or_default();
    for directive in extra.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let parsed = directive
            .parse()
            .map_err(|e| CommonError::Logging(format!("bad filter directive '{}': {}", directive, e)))?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

/// Install the process-wide subscriber
///
/// Call once at startup. Worker futures override it with their own
/// [`WorkerLogSink`] dispatcher.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.output.to_console() {
        layers.push(fmt_layer(config.format, std::io::stdout, config.ansi));
    }

    if config.output.to_file() {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Kept for the life of the process.
        std::mem::forget(guard);
        layers.push(fmt_layer(config.format, writer, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(config)?)
        .try_init()
        .map_err(|e| CommonError::Logging(e.to_string()))
}

/// Timestamp shared by every worker log file of a single run
pub fn run_timestamp() -> String {
    chrono::Local::now().format(RUN_TIMESTAMP_FORMAT).to_string()
}

/// Path of a worker log file
///
/// `location` is concatenated as given, so it normally ends with a path
/// separator (e.g. `/tmp/`).
pub fn worker_log_path(
    location: &str,
    prefix: &str,
    run_timestamp: &str,
    pid: u32,
    label: &str,
) -> PathBuf {
    PathBuf::from(format!("{}{}_{}_{}_{}.log", location, prefix, run_timestamp, pid, label))
}

/// Exclusive log file owned by one worker for its lifetime
///
/// Dropping the sink flushes and closes the file.
pub struct WorkerLogSink {
    path: PathBuf,
    dispatch: Dispatch,
    _guard: WorkerGuard,
}

impl WorkerLogSink {
    /// Create (truncating) the log file for worker `label` of this process
    pub fn create(
        location: &str,
        prefix: &str,
        run_timestamp: &str,
        label: &str,
        level: LogLevel,
    ) -> Result<Self> {
        let path = worker_log_path(location, prefix, run_timestamp, std::process::id(), label);
        Self::create_at(path, level)
    }

    /// Create a sink writing to an explicit path
    pub fn create_at(path: impl AsRef<Path>, level: LogLevel) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::File::create(&path)?;
        let (writer, guard) = tracing_appender::non_blocking(file);

        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
            .with_max_level(level.to_tracing_level())
            .finish();

        Ok(Self {
            path,
            dispatch: Dispatch::new(subscriber),
            _guard: guard,
        })
    }

    /// Dispatcher to install as the worker's scoped default
    pub fn dispatch(&self) -> Dispatch {
        self.dispatch.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for WorkerLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLogSink").field("path", &self.path).finish()
    }
}
