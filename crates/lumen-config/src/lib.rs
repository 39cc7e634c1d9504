use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod logging;
pub mod preferences;
pub mod store;

pub use logging::init_tracing;
pub use preferences::{Preference, Preferences};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level for all Lumen crates.
    ///
    /// Either a simple level (`info`, `debug`, ...) or a full
    /// `tracing_subscriber::EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path.
    ///
    /// If the file cannot be opened, file logging is disabled while stderr
    /// logging remains active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// The configured level as `EnvFilter` directives.
    ///
    /// Level names are matched case-insensitively and `warning` is accepted
    /// for `warn`; anything else is passed through as a directive string.
    pub fn level_directives(&self) -> String {
        let level = self.level.trim();
        if level.is_empty() {
            return Self::default_level();
        }
        let lower = level.to_ascii_lowercase();
        match lower.as_str() {
            "warning" => "warn".to_owned(),
            "off" | "error" | "warn" | "info" | "debug" | "trace" => lower,
            _ => level.to_owned(),
        }
    }

    /// The effective filter: the configured level with `RUST_LOG` appended,
    /// so environment directives win where both name the same target.
    pub fn env_filter(&self) -> EnvFilter {
        self.filter_with_overrides(std::env::var("RUST_LOG").ok().as_deref())
    }

    /// Tries the configured directives merged with `overrides`, then the
    /// overrides alone, then the configured directives alone. Falls back to
    /// `info` when none of them parse.
    fn filter_with_overrides(&self, overrides: Option<&str>) -> EnvFilter {
        let configured = self.level_directives();
        let mut attempts = Vec::with_capacity(3);
        if let Some(overrides) = overrides.map(str::trim).filter(|o| !o.is_empty()) {
            attempts.push(format!("{configured},{overrides}"));
            attempts.push(overrides.to_owned());
        }
        attempts.push(configured);

        attempts
            .into_iter()
            .find_map(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

/// Tunables for variable trees, evaluation and autocomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InspectorConfig {
    /// Collections longer than this are split into `[start - end]` range
    /// groups; it is also the largest window fetched in one request.
    #[serde(default = "InspectorConfig::default_grouping_threshold")]
    pub grouping_threshold: usize,

    /// Number of console expressions remembered for up/down navigation.
    #[serde(default = "InspectorConfig::default_history_capacity")]
    pub history_capacity: usize,

    /// Upper bound for a single inspection service request (milliseconds).
    #[serde(default = "InspectorConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl InspectorConfig {
    fn default_grouping_threshold() -> usize {
        100
    }

    fn default_history_capacity() -> usize {
        100
    }

    fn default_request_timeout_ms() -> u64 {
        10_000
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            grouping_threshold: Self::default_grouping_threshold(),
            history_capacity: Self::default_history_capacity(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreferencesConfig {
    /// JSON file backing persisted preferences. When unset, preferences only
    /// live in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LumenConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub inspector: InspectorConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

impl LumenConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inspector.grouping_threshold < 2 {
            return Err(ConfigError::Invalid(
                "inspector.grouping_threshold must be at least 2".to_string(),
            ));
        }
        if self.inspector.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "inspector.history_capacity must be at least 1".to_string(),
            ));
        }
        if self.inspector.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "inspector.request_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
