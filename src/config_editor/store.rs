use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::utils::error::ConfigEditError;

pub type ConfigMap = Map<String, Value>;

/// Reads and writes whole configuration files, relative to the config directory.
pub trait ConfigStore: Send + Sync + 'static {
    /// Contents of `path`. A missing file reads as an empty map.
    fn read(&self, path: &str) -> Result<ConfigMap, ConfigEditError>;

    fn write(&self, path: &str, data: &ConfigMap) -> Result<(), ConfigEditError>;
}

/// Stores each configuration file as a JSON object under `base_dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }
}

impl ConfigStore for JsonFileStore {
    fn read(&self, path: &str) -> Result<ConfigMap, ConfigEditError> {
        let full = self.resolve(path);
        let raw = match fs::read_to_string(&full) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %full.display(), "Config file missing, starting empty");
                return Ok(ConfigMap::new());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(ConfigMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write(&self, path: &str, data: &ConfigMap) -> Result<(), ConfigEditError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&full, serialized)?;
        debug!(path = %full.display(), "Config file written");
        Ok(())
    }
}
