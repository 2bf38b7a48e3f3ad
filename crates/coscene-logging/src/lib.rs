//! Structured multi-peer logging for Coscene
//!
//! - **JSONL output** to the console by default, pretty output for development
//! - **File output** with daily/hourly rotation via tracing-appender
//! - **Peer context**: spans carry the id of the peer they act for, so logs
//!   from several in-process peers can be told apart
//!
//! ```ignore
//! use coscene_logging::{CosceneSubscriberBuilder, LogConfig};
//!
//! let _guard = CosceneSubscriberBuilder::new()
//!     .with_config(LogConfig::verbose())
//!     .init();
//! ```
//!
//! `RUST_LOG` always takes precedence over the configured levels.

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleFormat, FileOutput, JsonFields, LogConfig, RollPeriod};
pub use context::peer_span;
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid filter directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to prepare log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create rolling appender: {0}")]
    Appender(String),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for configuring and installing the global subscriber
#[derive(Debug, Default)]
pub struct CosceneSubscriberBuilder {
    config: LogConfig,
}

impl CosceneSubscriberBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = format;
        self.config.ansi = format == ConsoleFormat::Pretty;
        self
    }

    pub fn with_file_output(mut self, config: FileOutput) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally.
    ///
    /// When file output is configured the returned guard flushes the
    /// background writer on drop and must be kept alive.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LogError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(self.config.directives())?,
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();

        match self.config.console {
            ConsoleFormat::Json => {
                layers.push(layers::jsonl_layer(std::io::stdout, &self.config.fields))
            }
            ConsoleFormat::Pretty => {
                layers.push(layers::pretty_layer(std::io::stdout, self.config.ansi))
            }
            ConsoleFormat::Off => {}
        }

        let mut guard = None;
        if let Some(file) = &self.config.file {
            let (writer, file_guard) = file_writer(file)?;
            guard = Some(file_guard);
            layers.push(layers::jsonl_layer(writer, &self.config.fields));
        }

        Registry::default().with(layers).with(filter).try_init()?;
        Ok(guard)
    }

    /// Like [`try_init`](Self::try_init), reporting failure on stderr
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: logging not initialized: {}", e);
                None
            }
        }
    }
}

/// Non-blocking writer for the configured file; truncates for `Never`
fn file_writer(config: &FileOutput) -> Result<(NonBlocking, WorkerGuard), LogError> {
    let rotation = match config.roll {
        RollPeriod::Never => {
            fs::create_dir_all(&config.directory)?;
            let path = config.directory.join(format!("{}.log", config.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
        RollPeriod::Daily => Rotation::DAILY,
        RollPeriod::Hourly => Rotation::HOURLY,
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log")
        .build(&config.directory)
        .map_err(|e| LogError::Appender(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSONL to the console at the default level
pub fn init_default() -> Option<WorkerGuard> {
    CosceneSubscriberBuilder::new().init()
}

/// Verbose pretty console output
pub fn init_verbose() -> Option<WorkerGuard> {
    CosceneSubscriberBuilder::new()
        .with_config(LogConfig::verbose())
        .init()
}

/// Warnings only; safe to call from many tests
pub fn init_quiet() {
    let _ = CosceneSubscriberBuilder::new()
        .with_config(LogConfig::quiet())
        .try_init();
}
