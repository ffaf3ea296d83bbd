use super::GlassesSession;
use crate::error::Result;
use crate::link::LinkState;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, info, warn};

const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const UPLOAD_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl GlassesSession {
    /// Perform graceful shutdown: cancel timers, let an in-flight upload finish, drop the link
    pub async fn shutdown(&self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Cancel signal handlers and pending fallback timers
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if !self.drain_uploads().await {
            warn!(
                "Upload still in flight after {:?}; abandoning it",
                UPLOAD_DRAIN_TIMEOUT
            );
            exit_code = 1;
        }

        if self.link.state() != LinkState::Disconnected {
            info!("Disconnecting from glasses");
            if timeout(DISCONNECT_TIMEOUT, self.link.disconnect())
                .await
                .is_err()
            {
                error!("Disconnect timed out after {:?}", DISCONNECT_TIMEOUT);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn drain_uploads(&self) -> bool {
        let deadline = Instant::now() + UPLOAD_DRAIN_TIMEOUT;
        while self.uploads.is_uploading() {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(UPLOAD_POLL_INTERVAL).await;
        }
        true
    }
}
