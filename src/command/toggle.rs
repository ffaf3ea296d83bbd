use crate::error::CommandError;
use parking_lot::Mutex;

/// Local view of a device mode that is flipped optimistically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    /// No toggle requested yet on this side
    Idle(bool),
    /// Request sent; the local flag already shows `target`
    Pending { previous: bool, target: bool },
    /// The device confirmed the last request
    Committed(bool),
    /// The last request failed and the flag went back to its prior value
    Reverted(bool),
}

impl ToggleState {
    /// Flag as currently shown to the user
    pub fn value(&self) -> bool {
        match *self {
            ToggleState::Idle(value)
            | ToggleState::Committed(value)
            | ToggleState::Reverted(value) => value,
            ToggleState::Pending { target, .. } => target,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ToggleState::Pending { .. })
    }
}

/// One device mode (video or audio recording) with at most one request outstanding
pub struct ModeToggle {
    mode: &'static str,
    state: Mutex<ToggleState>,
}

impl ModeToggle {
    pub fn new(mode: &'static str) -> Self {
        Self {
            mode,
            state: Mutex::new(ToggleState::Idle(false)),
        }
    }

    pub fn mode(&self) -> &'static str {
        self.mode
    }

    pub fn state(&self) -> ToggleState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().value()
    }

    /// Flip optimistically and return the requested value
    pub fn begin(&self) -> Result<bool, CommandError> {
        let mut state = self.state.lock();
        if state.is_pending() {
            return Err(CommandError::ToggleInFlight { mode: self.mode });
        }
        let previous = state.value();
        let target = !previous;
        *state = ToggleState::Pending { previous, target };
        Ok(target)
    }

    pub fn commit(&self) -> bool {
        let mut state = self.state.lock();
        let value = state.value();
        *state = ToggleState::Committed(value);
        value
    }

    pub fn revert(&self) -> bool {
        let mut state = self.state.lock();
        let value = match *state {
            ToggleState::Pending { previous, .. } => previous,
            other => other.value(),
        };
        *state = ToggleState::Reverted(value);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_commit() {
        let toggle = ModeToggle::new("video");
        assert!(!toggle.is_active());

        assert!(toggle.begin().unwrap());
        assert_eq!(
            toggle.state(),
            ToggleState::Pending {
                previous: false,
                target: true
            }
        );
        assert!(toggle.is_active());

        assert!(toggle.commit());
        assert_eq!(toggle.state(), ToggleState::Committed(true));
    }

    #[test]
    fn test_begin_revert_restores_previous() {
        let toggle = ModeToggle::new("audio");
        toggle.begin().unwrap();
        toggle.commit();

        assert!(!toggle.begin().unwrap());
        assert!(!toggle.is_active());
        assert!(toggle.revert());
        assert_eq!(toggle.state(), ToggleState::Reverted(true));
    }

    #[test]
    fn test_overlapping_toggle_is_rejected() {
        let toggle = ModeToggle::new("video");
        toggle.begin().unwrap();

        assert_eq!(
            toggle.begin(),
            Err(CommandError::ToggleInFlight { mode: "video" })
        );
        assert!(toggle.state().is_pending());
    }
}
