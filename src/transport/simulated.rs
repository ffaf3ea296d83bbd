use super::{LinkTransport, TransportEvent, TransportEventReceiver, TransportEventSender};
use crate::command::{CommandFrame, CommandResponse, DeviceInfo, MediaCounts};
use crate::error::TransportError;
use crate::link::{DeviceIdentity, DiscoveredDevice};
use crate::notification::TAG_CAPTURE_COMPLETE;
use crate::upload::MINIMAL_JPEG;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A call made against the simulated device
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Scan,
    ConnectDirectly(String),
    Disconnect,
    Enable,
    SendFrame(Vec<u8>),
    SyncTime,
    RequestBattery,
    RequestDeviceInfo,
}

/// How the simulated device answers a frame
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Reply(CommandResponse),
    ReplyAfter(Duration, CommandResponse),
    /// Never answer
    Silent,
    Fail(TransportError),
}

struct SimState {
    calls: Vec<TransportCall>,
    adapter_on: bool,
    connected: Option<String>,
    nearby: Vec<DiscoveredDevice>,
    unreachable: HashSet<String>,
    scripted: HashMap<Vec<u8>, ScriptedResponse>,
    auto_handshake: bool,
    enable_failure: Option<String>,
    battery: (u8, bool),
    device_info: DeviceInfo,
    media: MediaCounts,
    photo_dir: Option<PathBuf>,
    photos_taken: u32,
}

/// In-process stand-in for the glasses.
///
/// Records every call, answers frames from a script (accepting anything
/// unscripted), and can play the bond/service handshake on connect.
pub struct SimulatedTransport {
    state: Mutex<SimState>,
    events: TransportEventSender,
}

impl SimulatedTransport {
    pub fn new() -> (Self, TransportEventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();

        let transport = Self {
            state: Mutex::new(SimState {
                calls: Vec::new(),
                adapter_on: true,
                connected: None,
                nearby: Vec::new(),
                unreachable: HashSet::new(),
                scripted: HashMap::new(),
                auto_handshake: false,
                enable_failure: None,
                battery: (100, false),
                device_info: DeviceInfo {
                    hardware_version: "SIM-HW-1".to_string(),
                    firmware_version: "SIM-FW-1".to_string(),
                    wifi_hardware_version: "SIM-WHW-1".to_string(),
                    wifi_firmware_version: "SIM-WFW-1".to_string(),
                },
                media: MediaCounts::default(),
                photo_dir: None,
                photos_taken: 0,
            }),
            events,
        };

        (transport, receiver)
    }

    /// Push an event as if it came from the device
    pub fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("Simulated transport event dropped: receiver closed");
        }
    }

    /// Emit bond success and service-ready right after `connect_directly`
    pub fn set_auto_handshake(&self, enabled: bool) {
        self.state.lock().auto_handshake = enabled;
    }

    pub fn set_nearby(&self, devices: Vec<DiscoveredDevice>) {
        self.state.lock().nearby = devices;
    }

    pub fn set_unreachable(&self, address: &str) {
        self.state.lock().unreachable.insert(address.to_string());
    }

    pub fn set_response(&self, frame: CommandFrame, response: ScriptedResponse) {
        self.state
            .lock()
            .scripted
            .insert(frame.bytes().to_vec(), response);
    }

    /// Make `enable` fail with `details`; `None` restores success
    pub fn set_enable_failure(&self, details: Option<&str>) {
        self.state.lock().enable_failure = details.map(str::to_string);
    }

    pub fn set_battery(&self, level: u8, charging: bool) {
        self.state.lock().battery = (level, charging);
    }

    pub fn set_device_info(&self, info: DeviceInfo) {
        self.state.lock().device_info = info;
    }

    pub fn set_media_counts(&self, media: MediaCounts) {
        self.state.lock().media = media;
    }

    /// Write a JPEG here and emit the capture notification on every accepted photo command
    pub fn set_photo_dir(&self, dir: Option<PathBuf>) {
        self.state.lock().photo_dir = dir;
    }

    /// Toggle the adapter and emit the matching power event
    pub fn set_adapter_powered(&self, on: bool) {
        {
            let mut state = self.state.lock();
            state.adapter_on = on;
            if !on {
                state.connected = None;
            }
        }
        self.emit(if on {
            TransportEvent::AdapterPoweredOn
        } else {
            TransportEvent::AdapterPoweredOff
        });
    }

    /// Drop the physical link
    pub fn drop_link(&self) {
        self.state.lock().connected = None;
        self.emit(TransportEvent::LinkLost);
    }

    pub fn connected_address(&self) -> Option<String> {
        self.state.lock().connected.clone()
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::SendFrame(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn enable_calls(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, TransportCall::Enable))
            .count()
    }

    fn record(&self, call: TransportCall) {
        self.state.lock().calls.push(call);
    }

    fn require_adapter(&self) -> Result<(), TransportError> {
        if self.state.lock().adapter_on {
            Ok(())
        } else {
            Err(TransportError::AdapterOff)
        }
    }

    async fn store_photo(&self) {
        let (dir, index) = {
            let mut state = self.state.lock();
            state.photos_taken += 1;
            (state.photo_dir.clone(), state.photos_taken)
        };

        let Some(dir) = dir else {
            return;
        };

        let filename = format!("IMG_{}_{:03}.jpg", Local::now().format("%Y%m%d_%H%M%S"), index);
        let path = dir.join(&filename);

        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!("Simulated camera could not create {}: {}", dir.display(), e);
            return;
        }
        match tokio::fs::write(&path, MINIMAL_JPEG).await {
            Ok(()) => {
                info!("Simulated camera stored {}", path.display());
                let mut frame = vec![0u8; 6];
                frame.push(TAG_CAPTURE_COMPLETE);
                self.emit(TransportEvent::Notification(frame));
            }
            Err(e) => warn!("Simulated camera could not write {}: {}", path.display(), e),
        }
    }
}

#[async_trait]
impl LinkTransport for SimulatedTransport {
    async fn scan(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        self.record(TransportCall::Scan);
        self.require_adapter()?;
        debug!("Simulated scan for {:?}", duration);
        Ok(self.state.lock().nearby.clone())
    }

    async fn connect_directly(&self, address: &str) -> Result<(), TransportError> {
        self.record(TransportCall::ConnectDirectly(address.to_string()));
        self.require_adapter()?;

        let (handshake, name) = {
            let mut state = self.state.lock();
            if state.unreachable.contains(address) {
                return Err(TransportError::Unreachable {
                    address: address.to_string(),
                });
            }
            state.connected = Some(address.to_string());
            let name = state
                .nearby
                .iter()
                .find(|d| d.address == address)
                .map(|d| d.name.clone());
            (state.auto_handshake, name)
        };

        if handshake {
            self.emit(TransportEvent::BondResult {
                device: Some(DeviceIdentity::new(address, name)),
                success: true,
            });
            self.emit(TransportEvent::ServiceReady);
        }

        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Disconnect);
        self.state.lock().connected = None;
        Ok(())
    }

    async fn enable(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Enable);
        match self.state.lock().enable_failure.clone() {
            Some(details) => Err(TransportError::EnableFailed { details }),
            None => Ok(()),
        }
    }

    async fn send_frame(&self, frame: &[u8]) -> Result<CommandResponse, TransportError> {
        self.record(TransportCall::SendFrame(frame.to_vec()));

        let command = CommandFrame::from_bytes(frame);
        if command.is_none() {
            debug!("Simulated device got an unknown frame {:02x?}", frame);
        }

        let script = {
            let state = self.state.lock();
            if state.connected.is_none() {
                return Err(TransportError::NotConnected);
            }
            match state.scripted.get(frame) {
                Some(script) => script.clone(),
                None if command == Some(CommandFrame::MediaCount) => {
                    ScriptedResponse::Reply(CommandResponse {
                        image_count: state.media.photos,
                        video_count: state.media.videos,
                        record_count: state.media.audio,
                        ..CommandResponse::accepted()
                    })
                }
                None => ScriptedResponse::Reply(CommandResponse::accepted()),
            }
        };

        let response = match script {
            ScriptedResponse::Reply(response) => response,
            ScriptedResponse::ReplyAfter(delay, response) => {
                tokio::time::sleep(delay).await;
                response
            }
            ScriptedResponse::Silent => std::future::pending().await,
            ScriptedResponse::Fail(e) => return Err(e),
        };

        if command == Some(CommandFrame::CapturePhoto) && response.is_success() {
            self.store_photo().await;
        }

        Ok(response)
    }

    async fn sync_time(&self, now: DateTime<Local>) -> Result<(), TransportError> {
        self.record(TransportCall::SyncTime);
        if self.state.lock().connected.is_none() {
            return Err(TransportError::NotConnected);
        }
        debug!("Simulated clock set to {}", now.format("%Y-%m-%d %H:%M:%S"));
        Ok(())
    }

    async fn request_battery(&self) -> Result<(), TransportError> {
        self.record(TransportCall::RequestBattery);
        let (level, charging) = self.state.lock().battery;
        self.emit(TransportEvent::BatteryReport { level, charging });
        Ok(())
    }

    async fn request_device_info(&self) -> Result<DeviceInfo, TransportError> {
        self.record(TransportCall::RequestDeviceInfo);
        Ok(self.state.lock().device_info.clone())
    }
}
