use crate::error::Result;
use crate::session::GlassesSession;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Buttons of the companion screen, one key each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    Connect,
    Disconnect,
    TakePhoto,
    ToggleVideo,
    ToggleAudio,
    SyncTime,
    Battery,
    DeviceInfo,
    MediaCount,
    MediaSummary,
    Upload,
    ResetUploadTime,
    Help,
    Quit,
}

impl ConsoleAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        let action = match code {
            KeyCode::Char('c') => ConsoleAction::Connect,
            KeyCode::Char('d') => ConsoleAction::Disconnect,
            KeyCode::Char('p') | KeyCode::Char(' ') => ConsoleAction::TakePhoto,
            KeyCode::Char('v') => ConsoleAction::ToggleVideo,
            KeyCode::Char('a') => ConsoleAction::ToggleAudio,
            KeyCode::Char('t') => ConsoleAction::SyncTime,
            KeyCode::Char('b') => ConsoleAction::Battery,
            KeyCode::Char('i') => ConsoleAction::DeviceInfo,
            KeyCode::Char('m') => ConsoleAction::MediaCount,
            KeyCode::Char('g') => ConsoleAction::MediaSummary,
            KeyCode::Char('u') => ConsoleAction::Upload,
            KeyCode::Char('r') => ConsoleAction::ResetUploadTime,
            KeyCode::Char('h') | KeyCode::Char('?') => ConsoleAction::Help,
            KeyCode::Char('q') | KeyCode::Esc => ConsoleAction::Quit,
            _ => return None,
        };
        Some(action)
    }

    pub fn help_text() -> String {
        [
            "c connect",
            "d disconnect",
            "p photo",
            "v video",
            "a audio",
            "t sync time",
            "b battery",
            "i version",
            "m media count",
            "g download media",
            "u upload newest photo",
            "r reset upload history",
            "q quit",
        ]
        .join(" | ")
    }
}

/// Raw-mode keyboard console standing in for the phone screen
pub struct KeyboardConsole {
    session: Arc<GlassesSession>,
    cancellation_token: CancellationToken,
}

impl KeyboardConsole {
    pub fn new(session: Arc<GlassesSession>) -> Self {
        let cancellation_token = session.cancellation_token().child_token();
        Self {
            session,
            cancellation_token,
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard console - {}", ConsoleAction::help_text());

        let session = Arc::clone(&self.session);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        task::spawn_blocking(move || {
            // Enable raw mode to capture individual key presses
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard console active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard console stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        // Only handle key press events (not release)
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        let Some(action) = ConsoleAction::from_key(key_event.code) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        let session = Arc::clone(&session);
                        runtime_handle.spawn(async move {
                            session.perform(action).await;
                        });

                        if action == ConsoleAction::Quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard console task exited");
        });

        Ok(())
    }

    /// Stop the keyboard console
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard console");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Ensure raw mode is disabled even if the task didn't clean up properly
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(
            ConsoleAction::from_key(KeyCode::Char('p')),
            Some(ConsoleAction::TakePhoto)
        );
        assert_eq!(
            ConsoleAction::from_key(KeyCode::Char(' ')),
            Some(ConsoleAction::TakePhoto)
        );
        assert_eq!(
            ConsoleAction::from_key(KeyCode::Esc),
            Some(ConsoleAction::Quit)
        );
        assert_eq!(
            ConsoleAction::from_key(KeyCode::Char('g')),
            Some(ConsoleAction::MediaSummary)
        );
        assert_eq!(ConsoleAction::from_key(KeyCode::Char('z')), None);
        assert_eq!(ConsoleAction::from_key(KeyCode::Enter), None);
    }

    #[test]
    fn test_help_lists_quit() {
        assert!(ConsoleAction::help_text().contains("q quit"));
    }
}
