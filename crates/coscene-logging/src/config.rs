//! Logging settings, loadable as part of a node's TOML file

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What to log and where
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base filter level; `RUST_LOG` replaces the whole filter when set
    pub level: String,
    pub console: ConsoleFormat,
    /// Color escapes in pretty console output
    pub ansi: bool,
    /// Extra JSONL copy on disk
    pub file: Option<FileOutput>,
    pub fields: JsonFields,
    /// Per-target levels, e.g. `coscene_sync = "trace"`
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleFormat::Json,
            ansi: false,
            file: None,
            fields: JsonFields::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Pretty colored console at debug
    pub fn verbose() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleFormat::Pretty,
            ansi: true,
            ..Default::default()
        }
    }

    /// No console; JSONL files under `directory`
    pub fn headless(directory: PathBuf) -> Self {
        Self {
            console: ConsoleFormat::Off,
            file: Some(FileOutput {
                directory,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Warnings and errors only
    pub fn quiet() -> Self {
        Self {
            level: "warn".to_string(),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// `EnvFilter` directives: base level, then each target override
    pub fn directives(&self) -> String {
        let mut out = self.level.clone();
        for (target, level) in &self.targets {
            out.push_str(&format!(",{target}={level}"));
        }
        out
    }
}

/// Console rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    #[default]
    Json,
    Pretty,
    Off,
}

/// Rolling JSONL log files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOutput {
    pub directory: PathBuf,
    /// File names are `<prefix>.<date>.log`, or `<prefix>.log` without rolling
    pub prefix: String,
    pub roll: RollPeriod,
}

impl Default for FileOutput {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            prefix: "coscene".to_string(),
            roll: RollPeriod::Daily,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollPeriod {
    #[default]
    Daily,
    Hourly,
    /// One file, truncated on startup
    Never,
}

/// Which extra fields JSONL records carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFields {
    /// Event fields at the top level instead of under `fields`
    pub flatten: bool,
    /// Full span stack, not just the innermost span
    pub span_list: bool,
    pub source_location: bool,
    pub thread: bool,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            flatten: true,
            span_list: true,
            source_location: false,
            thread: false,
        }
    }
}
