use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::link::LinkState;

#[derive(Error, Debug)]
pub enum GlassesError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl GlassesError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the underlying wireless transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Bluetooth adapter is powered off")]
    AdapterOff,

    #[error("Device {address} not reachable")]
    Unreachable { address: String },

    #[error("Not connected to a device")]
    NotConnected,

    #[error("Frame send failed: {details}")]
    SendFailed { details: String },

    #[error("Device enable call failed: {details}")]
    EnableFailed { details: String },

    #[error("Scan failed with code {code}")]
    ScanFailed { code: i32 },
}

/// Connection state machine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("Transition '{transition}' ignored in state {state:?}")]
    OutOfOrderTransition {
        transition: &'static str,
        state: LinkState,
    },

    #[error("Connection to {address} not ready after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("No previously bonded device")]
    NotBonded,

    #[error("No named device found during scan")]
    NoDeviceFound,

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Command dispatcher errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Link not ready (state {state:?})")]
    NotReady { state: LinkState },

    #[error("A {mode} toggle is already waiting for a response")]
    ToggleInFlight { mode: &'static str },

    #[error("No response to {command} within {timeout:?}")]
    Timeout {
        command: &'static str,
        timeout: Duration,
    },

    #[error("Response to {command} arrived after the link changed; discarded")]
    Discarded { command: &'static str },

    #[error("{command} rejected by device (dataType={data_type}, errorCode={error_code})")]
    Rejected {
        command: &'static str,
        data_type: i32,
        error_code: i32,
    },

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Photo upload pipeline errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Backend API not configured. Go to Settings.")]
    NotConfigured,

    #[error("No photo found to upload")]
    NoPhotoFound,

    #[error("No new photo to upload")]
    NoNewPhoto,

    #[error("File not found or not readable: {}", path.display())]
    FileUnreadable { path: PathBuf },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {status} {body}")]
    Server { status: u16, body: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },
}

pub trait ErrorExt {
    fn is_recoverable(&self) -> bool;
    fn user_message(&self) -> String;
}

impl ErrorExt for CommandError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, CommandError::NotReady { .. })
    }

    fn user_message(&self) -> String {
        match self {
            CommandError::NotReady { .. } => "Glasses not ready yet. Connect first.".to_string(),
            CommandError::ToggleInFlight { mode } => {
                format!("Still waiting on the previous {} command", mode)
            }
            CommandError::Timeout { command, .. } => format!("{} timed out", command),
            CommandError::Discarded { command } => {
                format!("{} response dropped after disconnect", command)
            }
            CommandError::Rejected {
                command,
                data_type,
                error_code,
            } => format!("{}: type={}, err={}", command, data_type, error_code),
            CommandError::Transport(e) => format!("ERROR sending command: {}", e),
        }
    }
}

impl ErrorExt for UploadError {
    /// Network and server failures leave the photo eligible for a later attempt
    fn is_recoverable(&self) -> bool {
        matches!(self, UploadError::Network(_) | UploadError::Server { .. })
    }

    fn user_message(&self) -> String {
        if self.is_recoverable() {
            format!("{} - will retry on next capture", self)
        } else {
            self.to_string()
        }
    }
}

impl ErrorExt for LinkError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, LinkError::NotBonded)
    }

    fn user_message(&self) -> String {
        match self {
            LinkError::ConnectTimeout { .. } => "Connection timeout".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GlassesError>;
