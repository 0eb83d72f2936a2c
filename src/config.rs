//! Configuration System
//!
//! Index and logging settings, loaded from TOML files. Every field has a
//! default, so an empty file (or no file at all) is a valid configuration.
//!
//! ```toml
//! [index]
//! data_dir = "/var/lib/labeldb"
//! commit_debounce_ms = 2000
//!
//! [logging]
//! level = "debug"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Label index configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexConfig {
    /// Root directory holding the `dates` file and the `labels` directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Minimum time between two background flushes (ms)
    #[serde(default = "default_commit_debounce")]
    pub commit_debounce_ms: u64,

    /// Flush in the background; when off only `commit`/`close` write
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,

    /// Extra timestamp slots allocated whenever the store grows (0 means default)
    #[serde(default = "default_growth_rate")]
    pub timestamp_growth_rate: usize,

    /// Granularity of partial timestamp file writes (KB)
    #[serde(default = "default_save_block_size")]
    pub save_block_size_kb: usize,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("labeldb"))
        .unwrap_or_else(|| PathBuf::from("./labeldb_data"))
}

fn default_commit_debounce() -> u64 {
    2000 // 2 seconds
}

fn default_auto_commit() -> bool {
    true
}

fn default_growth_rate() -> usize {
    crate::storage::DEFAULT_GROWTH_RATE
}

fn default_save_block_size() -> usize {
    crate::storage::DEFAULT_SAVE_BLOCK_KB
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            commit_debounce_ms: default_commit_debounce(),
            auto_commit: default_auto_commit(),
            timestamp_growth_rate: default_growth_rate(),
            save_block_size_kb: default_save_block_size(),
        }
    }
}

impl IndexConfig {
    /// Default settings over the given directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_commit_debounce_ms(mut self, ms: u64) -> Self {
        self.commit_debounce_ms = ms;
        self
    }

    pub fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = enabled;
        self
    }

    /// Directory holding one sub-directory per label
    pub fn labels_dir(&self) -> PathBuf {
        self.data_dir.join("labels")
    }

    /// The `[index]` section of a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Config::load(path).map(|config| config.index)
    }

    /// The `[index]` section of TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Config::from_toml_str(content).map(|config| config.index)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load from the first default location that exists, else defaults
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("labeldb").join("config.toml")),
            Some(PathBuf::from("./labeldb.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        Self::default()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
///
/// `data_dir` holds the resolved default path.
pub fn generate_default_config() -> String {
    let data_dir = default_data_dir().to_string_lossy().into_owned();
    format!(
        r#"# LabelDB Configuration

[index]
# Root directory of the index (dates file and labels directory)
data_dir = {}

# Minimum time between two background flushes (ms)
commit_debounce_ms = 2000

# Flush changes in the background; when false only explicit commits write
auto_commit = true

# Extra timestamp slots allocated whenever the timestamp store grows
timestamp_growth_rate = 1000

# Timestamp file is rewritten in blocks of this size (KB)
save_block_size_kb = 4

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#,
        toml::Value::String(data_dir)
    )
}
