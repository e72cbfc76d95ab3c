//! Application configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `stress-analyzer.toml`, then `STRESS_*` environment variables
//! (`STRESS_BIND_ADDR`, `STRESS_DATA_DIR`, `STRESS_FALLBACK__SAMPLES`, ...).

use config::{Config, ConfigError, Environment, File};
use inference_engine::{EngineConfig, FallbackParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "stress-analyzer";

/// Logging options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Socket address the HTTP server binds
    pub bind_addr: String,
    /// Directory holding every data file
    pub data_dir: PathBuf,
    pub users_file: String,
    pub history_file: String,
    pub classifier_file: String,
    pub scaler_file: String,
    /// Trend bucket width and trailing "recent" window of the history summary
    pub window_days: i64,
    /// Synthetic fallback model parameters
    pub fallback: FallbackParams,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("data"),
            users_file: "users.csv".to_string(),
            history_file: "history.csv".to_string(),
            classifier_file: "classifier.bin".to_string(),
            scaler_file: "scaler.bin".to_string(),
            window_days: 7,
            fallback: FallbackParams::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration; an explicit file must exist, the default one may not
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix("STRESS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(&self.users_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_file)
    }

    /// Model paths and fallback parameters for the inference engine
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            classifier_path: self.data_dir.join(&self.classifier_file),
            scaler_path: self.data_dir.join(&self.scaler_file),
            fallback: self.fallback.clone(),
        }
    }
}
