use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GlassesConfig {
    pub link: LinkConfig,
    pub command: CommandConfig,
    pub upload: UploadConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LinkConfig {
    /// Seconds to wait for the link to become ready after a connect request
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Seconds a device scan runs before it is stopped
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_seconds: u64,

    /// Reconnect to the last bonded device when the adapter powers on
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommandConfig {
    /// Seconds before a pending command is treated as failed
    #[serde(default = "default_response_timeout")]
    pub response_timeout_seconds: u64,

    /// Delay before the fallback upload trigger fires after a successful photo command
    #[serde(default = "default_upload_fallback_delay")]
    pub upload_fallback_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    /// Directories scanned for newly captured photos
    #[serde(default = "default_photo_dirs")]
    pub photo_dirs: Vec<String>,

    /// Key-value settings file holding api_endpoint, api_key and device_address
    #[serde(default = "default_settings_path")]
    pub settings_path: String,

    /// HTTP connect timeout in seconds
    #[serde(default = "default_http_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Whole-request HTTP timeout in seconds
    #[serde(default = "default_http_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_seconds)
    }
}

impl CommandConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_seconds)
    }

    pub fn upload_fallback_delay(&self) -> Duration {
        Duration::from_millis(self.upload_fallback_delay_ms)
    }
}

impl UploadConfig {
    pub fn photo_dirs(&self) -> Vec<PathBuf> {
        self.photo_dirs.iter().map(PathBuf::from).collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl GlassesConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("cyanglasses.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "link.connect_timeout_seconds",
                default_connect_timeout() as i64,
            )?
            .set_default("link.scan_timeout_seconds", default_scan_timeout() as i64)?
            .set_default("link.auto_reconnect", default_auto_reconnect())?
            .set_default(
                "command.response_timeout_seconds",
                default_response_timeout() as i64,
            )?
            .set_default(
                "command.upload_fallback_delay_ms",
                default_upload_fallback_delay() as i64,
            )?
            .set_default("upload.photo_dirs", default_photo_dirs())?
            .set_default("upload.settings_path", default_settings_path())?
            .set_default(
                "upload.connect_timeout_seconds",
                default_http_connect_timeout() as i64,
            )?
            .set_default(
                "upload.request_timeout_seconds",
                default_http_request_timeout() as i64,
            )?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // CYANGLASSES_LINK__AUTO_RECONNECT=false
            .add_source(
                Environment::with_prefix("CYANGLASSES")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: GlassesConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.connect_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Link connect_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.link.scan_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Link scan_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.command.response_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Command response_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.upload.photo_dirs.is_empty() {
            return Err(ConfigError::Message(
                "At least one upload photo directory is required".to_string(),
            ));
        }

        if self.upload.settings_path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Upload settings_path must not be blank".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for GlassesConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig {
                connect_timeout_seconds: default_connect_timeout(),
                scan_timeout_seconds: default_scan_timeout(),
                auto_reconnect: default_auto_reconnect(),
            },
            command: CommandConfig {
                response_timeout_seconds: default_response_timeout(),
                upload_fallback_delay_ms: default_upload_fallback_delay(),
            },
            upload: UploadConfig {
                photo_dirs: default_photo_dirs(),
                settings_path: default_settings_path(),
                connect_timeout_seconds: default_http_connect_timeout(),
                request_timeout_seconds: default_http_request_timeout(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_connect_timeout() -> u64 {
    15
}
fn default_scan_timeout() -> u64 {
    15
}
fn default_auto_reconnect() -> bool {
    true
}

fn default_response_timeout() -> u64 {
    15
}
fn default_upload_fallback_delay() -> u64 {
    2000
}

fn default_photo_dirs() -> Vec<String> {
    vec!["./data/DCIM".to_string(), "./data/DCIM_1".to_string()]
}
fn default_settings_path() -> String {
    "./data/settings.toml".to_string()
}
fn default_http_connect_timeout() -> u64 {
    30
}
fn default_http_request_timeout() -> u64 {
    60
}

fn default_event_bus_capacity() -> usize {
    100
}
