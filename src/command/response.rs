use serde::{Deserialize, Serialize};

/// Asynchronous reply to a control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    pub data_type: i32,
    pub error_code: i32,
    /// Mode the device is currently working in
    pub work_mode_flag: i32,
    pub image_count: u32,
    pub video_count: u32,
    pub record_count: u32,
}

impl CommandResponse {
    /// Accepted response with zeroed counters
    pub fn accepted() -> Self {
        Self {
            data_type: 1,
            ..Self::default()
        }
    }

    pub fn rejected(data_type: i32, error_code: i32) -> Self {
        Self {
            data_type,
            error_code,
            ..Self::default()
        }
    }

    /// `dataType == 1 && errorCode == 0`; anything else is a rejection or still pending
    pub fn is_success(&self) -> bool {
        self.data_type == 1 && self.error_code == 0
    }
}

/// Firmware and hardware versions reported by the glasses
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub hardware_version: String,
    pub firmware_version: String,
    pub wifi_hardware_version: String,
    pub wifi_firmware_version: String,
}

impl DeviceInfo {
    pub fn summary(&self) -> String {
        format!("HW:{} FW:{}", self.hardware_version, self.firmware_version)
    }
}

/// Media stored on the glasses, from a media-count query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaCounts {
    pub photos: u32,
    pub videos: u32,
    pub audio: u32,
}

impl MediaCounts {
    pub fn total(&self) -> u32 {
        self.photos
            .saturating_add(self.videos)
            .saturating_add(self.audio)
    }

    /// Instructions shown when media is waiting on the glasses; `None` when empty
    pub fn download_summary(&self) -> Option<String> {
        if self.total() == 0 {
            return None;
        }

        Some(format!(
            "Found on glasses:\n\
             \u{2022} Photos: {}\n\
             \u{2022} Videos: {}\n\
             \u{2022} Audio: {}\n\n\
             To download files:\n\
             1. Connect glasses to WiFi hotspot\n\
             2. Copy files via USB when connected to computer\n\n\
             Downloaded files will appear in the photo directories.",
            self.photos, self.videos, self.audio
        ))
    }
}

impl From<&CommandResponse> for MediaCounts {
    fn from(response: &CommandResponse) -> Self {
        Self {
            photos: response.image_count,
            videos: response.video_count,
            audio: response.record_count,
        }
    }
}

impl std::fmt::Display for MediaCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Photos:{} Videos:{} Audio:{}",
            self.photos, self.videos, self.audio
        )
    }
}
