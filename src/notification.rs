//! Decoder for unsolicited notification frames pushed by the glasses.
//!
//! A frame carries its notification type at byte offset 6; type-specific
//! payload follows. Malformed frames decode to `None` and are never an error,
//! since this runs on the shared notification path.

use serde::{Deserialize, Serialize};

/// Offset of the notification type tag within a frame
pub const TYPE_TAG_OFFSET: usize = 6;

/// Shortest frame that carries a type tag
pub const MIN_FRAME_LEN: usize = TYPE_TAG_OFFSET + 1;

pub const TAG_CAPTURE_COMPLETE: u8 = 0x01;
pub const TAG_RECOGNITION_TRIGGERED: u8 = 0x02;
pub const TAG_MICROPHONE: u8 = 0x03;
pub const TAG_BATTERY: u8 = 0x05;

/// Typed device notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// A photo was captured on the glasses
    CaptureComplete,
    /// Quick recognition was triggered from the glasses
    RecognitionTriggered,
    /// The glasses microphone started
    MicrophoneStarted,
    /// Battery level (raw unsigned byte, nominally 0-100) and charging flag
    BatteryUpdate { level: u8, charging: bool },
    /// Notification type this decoder does not know
    Unknown { tag: u8 },
}

impl DeviceEvent {
    pub fn description(&self) -> String {
        match self {
            DeviceEvent::CaptureComplete => "Photo captured notification received".to_string(),
            DeviceEvent::RecognitionTriggered => {
                "Quick recognition triggered from glasses".to_string()
            }
            DeviceEvent::MicrophoneStarted => "Glasses microphone started".to_string(),
            DeviceEvent::BatteryUpdate { level, charging } => {
                format!("Battery update: {}%, charging={}", level, charging)
            }
            DeviceEvent::Unknown { tag } => format!("Unknown notification type: 0x{:x}", tag),
        }
    }
}

/// Decode a raw notification frame.
///
/// Returns `None` for frames shorter than [`MIN_FRAME_LEN`] and for known
/// types whose payload is too short.
pub fn decode(frame: &[u8]) -> Option<DeviceEvent> {
    let tag = *frame.get(TYPE_TAG_OFFSET)?;

    match tag {
        TAG_CAPTURE_COMPLETE => Some(DeviceEvent::CaptureComplete),
        TAG_RECOGNITION_TRIGGERED => Some(DeviceEvent::RecognitionTriggered),
        TAG_MICROPHONE => match frame.get(7) {
            Some(1) => Some(DeviceEvent::MicrophoneStarted),
            _ => None,
        },
        TAG_BATTERY => {
            if frame.len() <= 8 {
                return None;
            }
            Some(DeviceEvent::BatteryUpdate {
                level: frame[7],
                charging: frame[8] == 1,
            })
        }
        other => Some(DeviceEvent::Unknown { tag: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; TYPE_TAG_OFFSET];
        bytes.push(tag);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_short_frames_decode_to_nothing() {
        for len in 0..MIN_FRAME_LEN {
            // Fill with a valid tag value so only the length matters
            let bytes = vec![TAG_CAPTURE_COMPLETE; len];
            assert_eq!(decode(&bytes), None, "length {}", len);
        }
    }

    #[test]
    fn test_capture_complete() {
        assert_eq!(
            decode(&[0, 0, 0, 0, 0, 0, 0x01]),
            Some(DeviceEvent::CaptureComplete)
        );
    }

    #[test]
    fn test_recognition_triggered() {
        assert_eq!(
            decode(&frame(0x02, &[])),
            Some(DeviceEvent::RecognitionTriggered)
        );
    }

    #[test]
    fn test_battery_update() {
        assert_eq!(
            decode(&[0, 0, 0, 0, 0, 0, 0x05, 60, 1]),
            Some(DeviceEvent::BatteryUpdate {
                level: 60,
                charging: true
            })
        );
    }

    #[test]
    fn test_battery_charging_only_when_flag_is_one() {
        for flag in 0..=u8::MAX {
            let event = decode(&frame(TAG_BATTERY, &[42, flag])).unwrap();
            assert_eq!(
                event,
                DeviceEvent::BatteryUpdate {
                    level: 42,
                    charging: flag == 1
                }
            );
        }
    }

    #[test]
    fn test_battery_level_is_unsigned_byte() {
        for level in [0u8, 100, 0x80, 0xFF] {
            match decode(&frame(TAG_BATTERY, &[level, 0])) {
                Some(DeviceEvent::BatteryUpdate { level: decoded, .. }) => {
                    assert_eq!(decoded, level)
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_battery_without_payload_is_dropped() {
        assert_eq!(decode(&frame(TAG_BATTERY, &[])), None);
        assert_eq!(decode(&frame(TAG_BATTERY, &[60])), None);
    }

    #[test]
    fn test_microphone_started() {
        assert_eq!(
            decode(&frame(TAG_MICROPHONE, &[1])),
            Some(DeviceEvent::MicrophoneStarted)
        );
        assert_eq!(decode(&frame(TAG_MICROPHONE, &[0])), None);
        assert_eq!(decode(&frame(TAG_MICROPHONE, &[])), None);
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            decode(&frame(0x7A, &[1, 2, 3])),
            Some(DeviceEvent::Unknown { tag: 0x7A })
        );
        assert_eq!(
            decode(&frame(0x04, &[])),
            Some(DeviceEvent::Unknown { tag: 0x04 })
        );
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        assert_eq!(
            decode(&frame(TAG_CAPTURE_COMPLETE, &[9, 9, 9, 9])),
            Some(DeviceEvent::CaptureComplete)
        );
    }
}
