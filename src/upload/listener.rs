use crate::events::{EventBus, GlassesEvent};
use async_trait::async_trait;
use std::sync::Arc;

/// Filename reported when a failure happened before any file was chosen
pub const NO_FILE: &str = "none";

/// Observer of upload progress; every method defaults to a no-op
#[async_trait]
pub trait UploadListener: Send + Sync {
    async fn on_upload_started(&self, _filename: &str) {}

    async fn on_upload_progress(&self, _filename: &str, _message: &str) {}

    async fn on_upload_success(&self, _filename: &str, _response_body: Option<&str>) {}

    async fn on_upload_failed(&self, _filename: &str, _reason: &str) {}
}

/// Republishes upload progress on the event bus
pub struct EventBusUploadListener {
    event_bus: Arc<EventBus>,
}

impl EventBusUploadListener {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }
}

#[async_trait]
impl UploadListener for EventBusUploadListener {
    async fn on_upload_started(&self, filename: &str) {
        self.event_bus
            .notify(GlassesEvent::UploadStarted {
                filename: filename.to_string(),
            })
            .await;
    }

    async fn on_upload_progress(&self, filename: &str, message: &str) {
        self.event_bus
            .notify(GlassesEvent::UploadProgress {
                filename: filename.to_string(),
                message: message.to_string(),
            })
            .await;
    }

    async fn on_upload_success(&self, filename: &str, response_body: Option<&str>) {
        self.event_bus
            .notify(GlassesEvent::UploadSucceeded {
                filename: filename.to_string(),
                response_body: response_body.map(str::to_string),
            })
            .await;
    }

    async fn on_upload_failed(&self, filename: &str, reason: &str) {
        self.event_bus
            .notify(GlassesEvent::UploadFailed {
                filename: filename.to_string(),
                reason: reason.to_string(),
            })
            .await;
    }
}
