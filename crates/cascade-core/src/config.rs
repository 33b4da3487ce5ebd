//! Configuration loading for the cascade binaries.
//!
//! Configs are JSON files passed as the first CLI argument. Values are
//! validated for type and range before use; a bad config is a startup
//! error, never a runtime one.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Client configuration: where the server is and which seed to request.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Bound of the sampling domain [-seed, seed] to request.
    pub seed: f64,
    /// Server host address.
    pub address: String,
    /// Server UDP port.
    pub port: u16,
}

/// Server configuration: the listen port plus generator tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// UDP port to listen on.
    pub port: u16,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Dataset generator tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Worker thread count. 0 = available parallelism minus one.
    pub workers: usize,
    /// Samples drawn per instance per spin cycle.
    pub batch_size: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            batch_size: 10,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: ClientConfig = read_json(path)?;
        if !config.seed.is_finite() {
            return Err(ConfigError::InvalidValue("seed must be a finite number"));
        }
        if config.address.is_empty() {
            return Err(ConfigError::InvalidValue("address must not be empty"));
        }
        if config.port == 0 {
            return Err(ConfigError::InvalidValue("port must be non-zero"));
        }
        Ok(config)
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: ServerConfig = read_json(path)?;
        if config.port == 0 {
            return Err(ConfigError::InvalidValue("port must be non-zero"));
        }
        Ok(config)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(ConfigError::UnsupportedFormat(path.to_path_buf()));
    }
    let text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
}

/// Derive the client's result file from its config file name:
/// `output/<config stem>.bin`.
pub fn output_path(config_path: &Path) -> PathBuf {
    let stem = config_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "result".into());
    let mut out = PathBuf::from("output").join(stem);
    out.set_extension("bin");
    out
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}: only .json configs are supported")]
    UnsupportedFormat(PathBuf),
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, serde_json::Error),
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}
