//! Persisted key-value settings: backend endpoint, API key and the address of
//! the last bonded device.

use crate::error::{GlassesError, Result};
use parking_lot::RwLock;
use reqwest::Url;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const KEY_API_ENDPOINT: &str = "api_endpoint";
pub const KEY_API_KEY: &str = "api_key";
pub const KEY_DEVICE_ADDRESS: &str = "device_address";

/// Placeholder endpoint; uploads are refused while it is configured
pub const DEFAULT_ENDPOINT: &str = "https://httpbin.org/post";

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Settings held in memory only
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Settings persisted as a flat TOML table, rewritten on every change
pub struct FileSettingsStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileSettingsStore {
    /// Open the store, reading existing values if the file exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let values: BTreeMap<String, String> = toml::from_str(&content)?;
            debug!("Loaded {} settings from {}", values.len(), path.display());
            values
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string(values)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

/// Typed view over the upload-related keys
#[derive(Clone)]
pub struct UploadSettings {
    store: Arc<dyn SettingsStore>,
}

impl UploadSettings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub fn api_endpoint(&self) -> String {
        self.store
            .get(KEY_API_ENDPOINT)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    pub fn set_api_endpoint(&self, endpoint: &str) -> Result<()> {
        validate_endpoint(endpoint)?;
        self.store.set(KEY_API_ENDPOINT, endpoint.trim())?;
        info!("API endpoint set to {}", endpoint.trim());
        Ok(())
    }

    pub fn api_key(&self) -> Option<String> {
        self.store.get(KEY_API_KEY).filter(|k| !k.is_empty())
    }

    /// A missing or blank key removes the stored one
    pub fn set_api_key(&self, key: Option<&str>) -> Result<()> {
        match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => self.store.set(KEY_API_KEY, key),
            None => self.store.remove(KEY_API_KEY),
        }
    }

    /// True once the endpoint differs from the placeholder default
    pub fn is_endpoint_configured(&self) -> bool {
        let endpoint = self.api_endpoint();
        let endpoint = endpoint.trim();
        !endpoint.is_empty() && endpoint != DEFAULT_ENDPOINT
    }

    pub fn reset_to_defaults(&self) -> Result<()> {
        self.store.set(KEY_API_ENDPOINT, DEFAULT_ENDPOINT)?;
        self.store.remove(KEY_API_KEY)
    }

    pub fn device_address(&self) -> Option<String> {
        self.store.get(KEY_DEVICE_ADDRESS)
    }
}

/// Accept only parseable http/https URLs
pub fn validate_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint.trim())
        .map_err(|e| GlassesError::component("settings", format!("Invalid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(GlassesError::component(
            "settings",
            format!("URL must start with http:// or https:// (got {})", other),
        )),
    }
}
