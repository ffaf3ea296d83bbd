use serde::{Deserialize, Serialize};

/// Readiness of the link to the glasses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// No link; no command is valid
    Disconnected,
    /// Bonded, but the device enable handshake has not completed yet
    Connected,
    /// Enable handshake completed; all commands are valid
    Ready,
}

/// Hardware identity of the bonded device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub address: String,
    pub display_name: Option<String>,
}

impl DeviceIdentity {
    pub fn new<S: Into<String>>(address: S, display_name: Option<String>) -> Self {
        Self {
            address: address.into(),
            display_name,
        }
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.address)
    }
}

/// Consistent point-in-time view of the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub state: LinkState,
    pub identity: Option<DeviceIdentity>,
    /// Bumped on every new physical connection
    pub generation: u64,
}

impl LinkSnapshot {
    pub fn disconnected(generation: u64) -> Self {
        Self {
            state: LinkState::Disconnected,
            identity: None,
            generation,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready
    }

    pub fn address(&self) -> Option<&str> {
        self.identity.as_ref().map(|id| id.address.as_str())
    }
}

/// A device seen during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
    pub rssi: i16,
}

/// Drop unnamed devices, keep the first sighting of each address and order
/// by signal strength, strongest first.
pub fn sort_scan_results(devices: Vec<DiscoveredDevice>) -> Vec<DiscoveredDevice> {
    let mut unique: Vec<DiscoveredDevice> = Vec::with_capacity(devices.len());

    for device in devices {
        if device.name.trim().is_empty() {
            continue;
        }
        if unique.iter().any(|d| d.address == device.address) {
            continue;
        }
        unique.push(device);
    }

    unique.sort_by(|a, b| b.rssi.cmp(&a.rssi));
    unique
}
