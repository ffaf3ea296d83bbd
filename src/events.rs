use crate::error::EventBusError;
use crate::notification::DeviceEvent;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur while driving the glasses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GlassesEvent {
    /// Link readiness changed; `ready` is only true after the device enable call
    LinkStatusChanged {
        ready: bool,
        address: Option<String>,
        timestamp: SystemTime,
    },
    /// A decoded notification pushed by the device
    Device {
        event: DeviceEvent,
        timestamp: SystemTime,
    },
    /// Battery report delivered in response to a battery query
    BatteryReport { level: u8, charging: bool },
    /// A control command finished (successfully or not)
    CommandCompleted {
        command: String,
        success: bool,
        detail: String,
    },
    /// A photo upload was submitted
    UploadStarted { filename: String },
    /// Progress message for an in-flight upload
    UploadProgress { filename: String, message: String },
    /// The backend accepted a photo
    UploadSucceeded {
        filename: String,
        response_body: Option<String>,
    },
    /// An upload attempt failed or was refused before submission
    UploadFailed { filename: String, reason: String },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl GlassesEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            GlassesEvent::LinkStatusChanged { ready, address, .. } => format!(
                "Link {} ({})",
                if *ready { "ready" } else { "not ready" },
                address.as_deref().unwrap_or("no device")
            ),
            GlassesEvent::Device { event, .. } => event.description(),
            GlassesEvent::BatteryReport { level, charging } => format!(
                "Battery: {}%{}",
                level,
                if *charging { " (Charging)" } else { "" }
            ),
            GlassesEvent::CommandCompleted {
                command,
                success,
                detail,
            } => format!(
                "{} {}: {}",
                command,
                if *success { "succeeded" } else { "failed" },
                detail
            ),
            GlassesEvent::UploadStarted { filename } => format!("Upload started: {}", filename),
            GlassesEvent::UploadProgress { filename, message } => {
                format!("Upload progress: {} - {}", filename, message)
            }
            GlassesEvent::UploadSucceeded { filename, .. } => {
                format!("Upload SUCCESS: {}", filename)
            }
            GlassesEvent::UploadFailed { filename, reason } => {
                format!("Upload failed: {} - {}", filename, reason)
            }
            GlassesEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            GlassesEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            GlassesEvent::LinkStatusChanged { .. } => "link_status_changed",
            GlassesEvent::Device { .. } => "device",
            GlassesEvent::BatteryReport { .. } => "battery_report",
            GlassesEvent::CommandCompleted { .. } => "command_completed",
            GlassesEvent::UploadStarted { .. } => "upload_started",
            GlassesEvent::UploadProgress { .. } => "upload_progress",
            GlassesEvent::UploadSucceeded { .. } => "upload_succeeded",
            GlassesEvent::UploadFailed { .. } => "upload_failed",
            GlassesEvent::SystemError { .. } => "system_error",
            GlassesEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Typed broadcast channel shared by the session's components
pub struct EventBus {
    sender: broadcast::Sender<GlassesEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<GlassesEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter and a name used in log lines
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: GlassesEvent) -> Result<usize, EventBusError> {
        match &event {
            GlassesEvent::LinkStatusChanged { ready, .. } => {
                if *ready {
                    info!("{}", event.description());
                } else {
                    warn!("{}", event.description());
                }
            }
            GlassesEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            GlassesEvent::UploadFailed { .. } => warn!("{}", event.description()),
            GlassesEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish without caring whether anybody is listening
    pub async fn notify(&self, event: GlassesEvent) {
        if let Err(e) = self.publish(event).await {
            debug!("Event dropped: {}", e);
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &GlassesEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<GlassesEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<GlassesEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<GlassesEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<GlassesEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
