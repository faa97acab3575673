use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_PATH: &str = "classifier.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub upload_dir: PathBuf,
    pub model: ModelConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// `.onnx` files go through tract, anything else is native CNN weights.
    pub path: PathBuf,
    /// Write an untrained placeholder model when `path` does not exist.
    pub create_if_missing: bool,
    pub inference_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
            upload_dir: PathBuf::from("static/uploads"),
            model: ModelConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model.json"),
            create_if_missing: true,
            inference_timeout_secs: 30,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Mongodb,
            uri: "mongodb://localhost:27017/".to_string(),
            database: "image_classification_db".to_string(),
            collection: "predictions".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// Reads `path` if it exists, otherwise falls back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

impl ModelConfig {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:5000");
        assert_eq!(config.upload_dir, PathBuf::from("static/uploads"));
        assert_eq!(config.model.path, PathBuf::from("model.json"));
        assert!(config.model.create_if_missing);
        assert_eq!(config.store.backend, StoreBackend::Mongodb);
        assert_eq!(config.store.collection, "predictions");
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = Config::from_toml(
            r#"
            bind_address = "0.0.0.0:8080"

            [model]
            create_if_missing = false

            [store]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert!(!config.model.create_if_missing);
        assert_eq!(config.model.inference_timeout(), Duration::from_secs(30));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.database, "image_classification_db");
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = Config::from_toml("[store]\nbackend = \"redis\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
