use super::GlassesSession;
use crate::command::CommandResponse;
use crate::error::{CommandError, ErrorExt, LinkError};
use crate::events::GlassesEvent;
use crate::keyboard_input::ConsoleAction;
use crate::link::LinkSnapshot;
use crate::upload::UploadAttempt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

impl GlassesSession {
    /// Run the upload pipeline for the newest photo
    pub async fn trigger_upload(&self) -> UploadAttempt {
        self.uploads.on_capture_complete().await
    }

    /// Take a photo and arm the fallback upload trigger.
    ///
    /// The capture notification normally starts the upload; the fallback
    /// covers devices that never send it.
    pub async fn take_photo(&self) -> Result<CommandResponse, CommandError> {
        let response = self.dispatcher.take_photo().await?;

        let uploads = Arc::clone(&self.uploads);
        let token = self.cancellation_token.clone();
        let delay = self.config.command.upload_fallback_delay();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    debug!("Fallback upload trigger after {:?}", delay);
                    if let UploadAttempt::Submitted(task) = uploads.on_capture_complete().await {
                        debug!("Fallback submitted {}", task.filename());
                    }
                }
                _ = token.cancelled() => {}
            }
        });

        Ok(response)
    }

    /// Reconnect to the last bonded device, or the strongest nearby one
    pub async fn connect(&self) -> Result<LinkSnapshot, LinkError> {
        match self.settings.device_address() {
            Some(address) => self.link.connect(&address).await,
            None => self.link.connect_nearest().await,
        }
    }

    /// Execute one console action and report the outcome
    pub async fn perform(&self, action: ConsoleAction) {
        debug!("Console action: {:?}", action);

        let outcome: Result<String, (String, bool)> = match action {
            ConsoleAction::Connect => self
                .connect()
                .await
                .map(|s| format!("Connected to {}", s.address().unwrap_or("device")))
                .map_err(failure),
            ConsoleAction::Disconnect => {
                self.link.disconnect().await;
                Ok("Disconnected".to_string())
            }
            ConsoleAction::TakePhoto => self
                .take_photo()
                .await
                .map(|_| "Photo taken".to_string())
                .map_err(failure),
            ConsoleAction::ToggleVideo => self
                .dispatcher
                .toggle_video()
                .await
                .map(|on| format!("Video {}", if on { "recording" } else { "stopped" }))
                .map_err(failure),
            ConsoleAction::ToggleAudio => self
                .dispatcher
                .toggle_audio()
                .await
                .map(|on| format!("Audio {}", if on { "recording" } else { "stopped" }))
                .map_err(failure),
            ConsoleAction::SyncTime => self
                .dispatcher
                .sync_time()
                .await
                .map(|_| "Time synced".to_string())
                .map_err(failure),
            ConsoleAction::Battery => self
                .dispatcher
                .request_battery()
                .await
                .map(|_| "Battery requested".to_string())
                .map_err(failure),
            ConsoleAction::DeviceInfo => self
                .dispatcher
                .device_info()
                .await
                .map(|info| info.summary())
                .map_err(failure),
            ConsoleAction::MediaCount => self
                .dispatcher
                .media_counts()
                .await
                .map(|counts| counts.to_string())
                .map_err(failure),
            ConsoleAction::MediaSummary => self
                .dispatcher
                .media_summary()
                .await
                .map(|summary| {
                    summary.unwrap_or_else(|| "No media files found on glasses".to_string())
                })
                .map_err(failure),
            ConsoleAction::Upload => match self.trigger_upload().await {
                UploadAttempt::Submitted(task) => Ok(format!("Uploading {}", task.filename())),
                UploadAttempt::Skipped => Ok("Upload already in progress".to_string()),
                UploadAttempt::Rejected(e) => Err(failure(e)),
            },
            ConsoleAction::ResetUploadTime => {
                self.uploads.reset_last_upload_time();
                Ok("Upload history reset".to_string())
            }
            ConsoleAction::Help => Ok(ConsoleAction::help_text()),
            ConsoleAction::Quit => {
                self.event_bus
                    .notify(GlassesEvent::ShutdownRequested {
                        timestamp: SystemTime::now(),
                        reason: "User requested via keyboard".to_string(),
                    })
                    .await;
                Ok("Quitting".to_string())
            }
        };

        match outcome {
            Ok(message) => info!("{}", message),
            Err((message, true)) => warn!("{}", message),
            Err((message, false)) => error!("{}", message),
        }
    }
}

fn failure<E: ErrorExt>(e: E) -> (String, bool) {
    (e.user_message(), e.is_recoverable())
}
