use super::frame::CommandFrame;
use super::response::{CommandResponse, DeviceInfo, MediaCounts};
use super::toggle::ModeToggle;
use crate::error::{CommandError, ErrorExt, TransportError};
use crate::events::{EventBus, GlassesEvent};
use crate::link::{ConnectionStateMachine, LinkState};
use crate::transport::LinkTransport;
use chrono::Local;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Readiness-gated command surface for the glasses.
///
/// Every command checks the link is Ready before any transport I/O, waits at
/// most `timeout` for the paired response, and drops responses that arrive
/// after the link changed underneath them.
pub struct CommandDispatcher {
    link: Arc<ConnectionStateMachine>,
    transport: Arc<dyn LinkTransport>,
    event_bus: Arc<EventBus>,
    timeout: Duration,
    video: ModeToggle,
    audio: ModeToggle,
}

impl CommandDispatcher {
    pub fn new(
        link: Arc<ConnectionStateMachine>,
        transport: Arc<dyn LinkTransport>,
        event_bus: Arc<EventBus>,
        timeout: Duration,
    ) -> Self {
        Self {
            link,
            transport,
            event_bus,
            timeout,
            video: ModeToggle::new("video"),
            audio: ModeToggle::new("audio"),
        }
    }

    /// Send a control frame; success means `dataType == 1 && errorCode == 0`
    pub async fn send(&self, frame: CommandFrame) -> Result<CommandResponse, CommandError> {
        let command = frame.name();
        let bytes = frame.bytes();
        debug!("Sending {}", frame);

        let result = self
            .exchange(command, |transport| async move {
                transport.send_frame(bytes).await
            })
            .await
            .and_then(|response| {
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(CommandError::Rejected {
                        command,
                        data_type: response.data_type,
                        error_code: response.error_code,
                    })
                }
            });

        self.report(command, &result).await;
        result
    }

    /// Trigger the camera; the photo itself arrives through the capture notification
    pub async fn take_photo(&self) -> Result<CommandResponse, CommandError> {
        let response = self.send(CommandFrame::CapturePhoto).await?;
        info!("Photo command accepted");
        Ok(response)
    }

    /// Start or stop video recording; returns the committed recording flag
    pub async fn toggle_video(&self) -> Result<bool, CommandError> {
        self.toggle(&self.video, CommandFrame::VideoStart, CommandFrame::VideoStop)
            .await
    }

    /// Start or stop audio recording; returns the committed recording flag
    pub async fn toggle_audio(&self) -> Result<bool, CommandError> {
        self.toggle(&self.audio, CommandFrame::AudioStart, CommandFrame::AudioStop)
            .await
    }

    pub fn is_recording_video(&self) -> bool {
        self.video.is_active()
    }

    pub fn is_recording_audio(&self) -> bool {
        self.audio.is_active()
    }

    pub fn video_toggle(&self) -> &ModeToggle {
        &self.video
    }

    pub fn audio_toggle(&self) -> &ModeToggle {
        &self.audio
    }

    /// Push the phone's local clock to the glasses
    pub async fn sync_time(&self) -> Result<(), CommandError> {
        let result = self
            .exchange("time sync", |transport| async move {
                transport.sync_time(Local::now()).await
            })
            .await;
        self.report("time sync", &result).await;
        result
    }

    /// Ask for a battery report; the level arrives later as a `BatteryReport` event
    pub async fn request_battery(&self) -> Result<(), CommandError> {
        let result = self
            .exchange("battery", |transport| async move {
                transport.request_battery().await
            })
            .await;
        self.report("battery", &result).await;
        result
    }

    pub async fn device_info(&self) -> Result<DeviceInfo, CommandError> {
        let result = self
            .exchange("version", |transport| async move {
                transport.request_device_info().await
            })
            .await;
        if let Ok(info) = &result {
            info!(
                "Device info: hw={} fw={} wifi_hw={} wifi_fw={}",
                info.hardware_version,
                info.firmware_version,
                info.wifi_hardware_version,
                info.wifi_firmware_version
            );
        }
        self.report("version", &result).await;
        result
    }

    pub async fn media_counts(&self) -> Result<MediaCounts, CommandError> {
        let response = self.send(CommandFrame::MediaCount).await?;
        let counts = MediaCounts::from(&response);
        info!("Media on glasses: {}", counts);
        Ok(counts)
    }

    /// Media-count query rendered as download instructions; `None` when nothing is stored
    pub async fn media_summary(&self) -> Result<Option<String>, CommandError> {
        Ok(self.media_counts().await?.download_summary())
    }

    async fn toggle(
        &self,
        toggle: &ModeToggle,
        start: CommandFrame,
        stop: CommandFrame,
    ) -> Result<bool, CommandError> {
        // Gate before flipping so a refused command leaves no trace
        let state = self.link.state();
        if state != LinkState::Ready {
            let err = CommandError::NotReady { state };
            self.report(toggle.mode(), &Err::<(), _>(err.clone())).await;
            return Err(err);
        }

        let target = toggle.begin()?;
        let frame = if target { start } else { stop };

        match self.send(frame).await {
            Ok(_) => {
                let value = toggle.commit();
                info!("{} recording {}", toggle.mode(), if value { "started" } else { "stopped" });
                Ok(value)
            }
            Err(e) => {
                let value = toggle.revert();
                warn!(
                    "{} toggle failed, reverted to {}: {}",
                    toggle.mode(),
                    if value { "recording" } else { "idle" },
                    e
                );
                Err(e)
            }
        }
    }

    /// Readiness gate, response timeout and stale-response check around one transport call
    async fn exchange<T, F, Fut>(&self, command: &'static str, call: F) -> Result<T, CommandError>
    where
        F: FnOnce(Arc<dyn LinkTransport>) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let sent = self.link.snapshot();
        if !sent.is_ready() {
            debug!("{} refused: link {:?}", command, sent.state);
            return Err(CommandError::NotReady { state: sent.state });
        }

        let value = match tokio::time::timeout(self.timeout, call(self.transport.clone())).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err(CommandError::Transport(e)),
            Err(_) => {
                warn!("No response to {} within {:?}", command, self.timeout);
                return Err(CommandError::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
        };

        let now = self.link.snapshot();
        if !now.is_ready() || now.generation != sent.generation {
            warn!(
                "Discarding {} response: link went from generation {} to {} ({:?})",
                command, sent.generation, now.generation, now.state
            );
            return Err(CommandError::Discarded { command });
        }

        Ok(value)
    }

    async fn report<T>(&self, command: &str, result: &Result<T, CommandError>) {
        let (success, detail) = match result {
            Ok(_) => (true, "OK".to_string()),
            Err(e) => (false, e.user_message()),
        };
        self.event_bus
            .notify(GlassesEvent::CommandCompleted {
                command: command.to_string(),
                success,
                detail,
            })
            .await;
    }
}
