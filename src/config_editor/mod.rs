//! The `config_editor` module edits key-based configuration files.
//!
//! Each section (only `group` for now) is a single file holding an object of
//! entries keyed by id. Reads return one entry; writes validate the entry,
//! merge it into the file and write the whole file back.
//!
//! - `store`: whole-file access through the `ConfigStore` trait
//! - `group`: schema of a group entry

pub mod group;
pub mod store;

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::utils::error::ConfigEditError;
use crate::utils::slug::is_slug;

pub use group::{GroupConfig, validate_group};
pub use store::{ConfigMap, ConfigStore, JsonFileStore};

pub const GROUP_CONFIG_PATH: &str = "groups.json";

type Validator = fn(&Value) -> Result<(), ConfigEditError>;

/// A configuration section edited entry by entry.
pub struct EditKeyBasedConfigView<S> {
    component: &'static str,
    path: &'static str,
    validate: Validator,
    store: Arc<S>,
    write_lock: Mutex<()>,
}

impl<S: ConfigStore> EditKeyBasedConfigView<S> {
    pub fn new(component: &'static str, path: &'static str, validate: Validator, store: S) -> Self {
        Self {
            component,
            path,
            validate,
            store: Arc::new(store),
            write_lock: Mutex::new(()),
        }
    }

    /// The view for `groups.json`.
    pub fn group(store: S) -> Self {
        Self::new("group", GROUP_CONFIG_PATH, |data| validate_group(data).map(|_| ()), store)
    }

    pub fn url(&self) -> String {
        format!("/api/config/{}/config/{{key}}", self.component)
    }

    pub fn name(&self) -> String {
        format!("api:config:{}:config", self.component)
    }

    /// Entry stored under `key`.
    pub async fn get(&self, key: &str) -> Result<Value, ConfigEditError> {
        let current = self.read().await?;
        current.get(key).cloned().ok_or(ConfigEditError::NotFound)
    }

    /// Validate `body` and merge it into the entry stored under `key`.
    pub async fn post(&self, key: &str, body: &str) -> Result<Value, ConfigEditError> {
        let data: Value = serde_json::from_str(body).map_err(|_| ConfigEditError::InvalidJson)?;

        if !is_slug(key) {
            return Err(ConfigEditError::InvalidKey(key.to_string()));
        }
        (self.validate)(&data)?;

        let _guard = self.write_lock.lock().await;
        let mut current = self.read().await?;
        let entry = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Default::default()));

        match (entry, data) {
            (Value::Object(existing), Value::Object(update)) => existing.extend(update),
            (entry, update) => *entry = update,
        }

        self.write(current).await?;
        info!(component = self.component, key, "Configuration entry updated");
        Ok(json!({"result": "ok"}))
    }

    async fn read(&self) -> Result<ConfigMap, ConfigEditError> {
        let store = Arc::clone(&self.store);
        let path = self.path;
        debug!(path, "Reading config file");
        tokio::task::spawn_blocking(move || store.read(path))
            .await
            .map_err(|e| ConfigEditError::Io(std::io::Error::other(e)))?
    }

    async fn write(&self, data: ConfigMap) -> Result<(), ConfigEditError> {
        let store = Arc::clone(&self.store);
        let path = self.path;
        tokio::task::spawn_blocking(move || store.write(path, &data))
            .await
            .map_err(|e| ConfigEditError::Io(std::io::Error::other(e)))?
    }
}
