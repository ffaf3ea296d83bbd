use super::{GlassesSession, ShutdownReason};
use crate::error::{EventBusError, GlassesError, LinkError, Result};
use crate::events::{EventFilter, GlassesEvent};
use crate::notification::{self, DeviceEvent};
use crate::transport::TransportEvent;
use crate::upload::UploadAttempt;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

impl GlassesSession {
    /// Drive the session until a signal, user request or transport shutdown
    pub async fn run(&self) -> Result<i32> {
        info!("Glasses session is running");

        let mut transport_events = self
            .transport_events
            .lock()
            .await
            .take()
            .ok_or_else(|| GlassesError::system("Transport event stream already taken"))?;

        let mut shutdown_receiver = self
            .shutdown_receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| GlassesError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(Arc::clone(&self.shutdown_sender));

        let mut shutdown_requests = self.event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "session-shutdown",
        );

        let reason = loop {
            tokio::select! {
                reason = &mut shutdown_receiver => {
                    break reason.unwrap_or_else(|_| {
                        ShutdownReason::Error("Shutdown channel closed unexpectedly".to_string())
                    });
                }
                event = transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => {
                        warn!("Transport event stream ended");
                        self.report_system_error("transport", "event stream closed").await;
                        break ShutdownReason::Error("Transport closed".to_string());
                    }
                },
                request = shutdown_requests.recv() => match request {
                    Ok(GlassesEvent::ShutdownRequested { reason, .. }) => {
                        break ShutdownReason::UserRequest(reason);
                    }
                    Ok(_) | Err(EventBusError::Lagged { .. }) => {}
                    Err(e) => debug!("Shutdown request channel: {}", e),
                },
                _ = self.cancellation_token.cancelled() => {
                    break ShutdownReason::UserRequest("Session cancelled".to_string());
                }
            }
        };

        info!("Shutdown initiated: {:?}", reason);
        let exit_code = self.shutdown().await?;

        info!("Glasses session shutdown complete");
        Ok(exit_code)
    }

    /// Ask a running session to stop
    pub async fn request_shutdown(&self, reason: ShutdownReason) {
        if let Some(sender) = self.shutdown_sender.lock().await.take() {
            let _ = sender.send(reason);
        }
    }

    /// Route one transport event to the component that owns it
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::BondResult { device, success } => {
                self.link.on_bond_result(device, success).await;
            }
            TransportEvent::ServiceReady => {
                match self.link.on_initialization_handshake_complete().await {
                    Ok(()) => {}
                    Err(LinkError::Transport(e)) => {
                        self.report_system_error("link", &e.to_string()).await;
                    }
                    Err(e) => warn!("Initialization handshake not applied: {}", e),
                }
            }
            TransportEvent::Notification(frame) => self.handle_notification(&frame).await,
            TransportEvent::BatteryReport { level, charging } => {
                self.event_bus
                    .notify(GlassesEvent::BatteryReport { level, charging })
                    .await;
            }
            TransportEvent::LinkLost => self.link.on_link_lost().await,
            TransportEvent::AdapterPoweredOn => self.link.on_adapter_powered_on().await,
            TransportEvent::AdapterPoweredOff => self.link.on_adapter_powered_off().await,
        }
    }

    async fn report_system_error(&self, component: &str, error: &str) {
        self.event_bus
            .notify(GlassesEvent::SystemError {
                component: component.to_string(),
                error: error.to_string(),
            })
            .await;
    }

    async fn handle_notification(&self, frame: &[u8]) {
        let Some(event) = notification::decode(frame) else {
            debug!("Dropping malformed notification ({} bytes)", frame.len());
            return;
        };

        debug!("{}", event.description());
        self.event_bus
            .notify(GlassesEvent::Device {
                event,
                timestamp: SystemTime::now(),
            })
            .await;

        match event {
            DeviceEvent::CaptureComplete => {
                if let UploadAttempt::Submitted(task) = self.trigger_upload().await {
                    debug!("Upload of {} submitted from capture notification", task.filename());
                }
            }
            DeviceEvent::BatteryUpdate { level, charging } => {
                info!("Battery {}%{}", level, if charging { " (charging)" } else { "" });
            }
            DeviceEvent::RecognitionTriggered | DeviceEvent::MicrophoneStarted => {
                info!("{}", event.description());
            }
            DeviceEvent::Unknown { tag } => debug!("Unhandled notification tag 0x{:02x}", tag),
        }
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(
        &self,
        shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    ) {
        let token = self.cancellation_token.clone();

        // Handle SIGTERM - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            let token = token.clone();
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                tokio::select! {
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                            let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                    _ = token.cancelled() => {}
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            tokio::select! {
                Ok(()) = signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }
}
