//! Boundary to the wireless link SDK.
//!
//! The state machine, dispatcher and session only ever talk to the glasses
//! through [`LinkTransport`]. Unsolicited traffic from the device arrives as
//! [`TransportEvent`]s on the channel handed out when the transport is built.

pub mod simulated;

pub use simulated::{ScriptedResponse, SimulatedTransport, TransportCall};

use crate::command::{CommandResponse, DeviceInfo};
use crate::error::TransportError;
use crate::link::{DeviceIdentity, DiscoveredDevice};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::sync::mpsc;

/// Events pushed by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Outcome of a bond attempt started by `connect_directly`
    BondResult {
        device: Option<DeviceIdentity>,
        success: bool,
    },
    /// The device's services finished initialising; `enable` may now be called
    ServiceReady,
    /// Raw notification frame
    Notification(Vec<u8>),
    /// Reply to a battery query
    BatteryReport { level: u8, charging: bool },
    /// The physical link dropped
    LinkLost,
    AdapterPoweredOn,
    AdapterPoweredOff,
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// Scan for nearby devices for `duration`
    async fn scan(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Start bonding with a known address; the outcome arrives as `BondResult`
    async fn connect_directly(&self, address: &str) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Mandatory one-time device enable call after the service handshake
    async fn enable(&self) -> Result<(), TransportError>;

    /// Send a control frame and wait for the correlated response.
    ///
    /// The future may never resolve if the device stays silent; callers
    /// apply their own timeout.
    async fn send_frame(&self, frame: &[u8]) -> Result<CommandResponse, TransportError>;

    async fn sync_time(&self, now: DateTime<Local>) -> Result<(), TransportError>;

    /// Ask for a battery report; the answer arrives as `BatteryReport`
    async fn request_battery(&self) -> Result<(), TransportError>;

    async fn request_device_info(&self) -> Result<DeviceInfo, TransportError>;
}
