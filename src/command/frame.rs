/// Command group byte shared by every control frame
pub const GROUP_CONTROL: u8 = 0x02;

const CAPTURE_PHOTO: [u8; 3] = [GROUP_CONTROL, 0x01, 0x01];
const VIDEO_START: [u8; 3] = [GROUP_CONTROL, 0x01, 0x02];
const VIDEO_STOP: [u8; 3] = [GROUP_CONTROL, 0x01, 0x03];
const AUDIO_START: [u8; 3] = [GROUP_CONTROL, 0x01, 0x08];
const AUDIO_STOP: [u8; 3] = [GROUP_CONTROL, 0x01, 0x0C];
const MEDIA_COUNT: [u8; 2] = [GROUP_CONTROL, 0x04];

/// Control frames understood by the glasses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFrame {
    CapturePhoto,
    VideoStart,
    VideoStop,
    AudioStart,
    AudioStop,
    MediaCount,
}

impl CommandFrame {
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            CommandFrame::CapturePhoto => &CAPTURE_PHOTO,
            CommandFrame::VideoStart => &VIDEO_START,
            CommandFrame::VideoStop => &VIDEO_STOP,
            CommandFrame::AudioStart => &AUDIO_START,
            CommandFrame::AudioStop => &AUDIO_STOP,
            CommandFrame::MediaCount => &MEDIA_COUNT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandFrame::CapturePhoto => "photo",
            CommandFrame::VideoStart => "video start",
            CommandFrame::VideoStop => "video stop",
            CommandFrame::AudioStart => "audio start",
            CommandFrame::AudioStop => "audio stop",
            CommandFrame::MediaCount => "media count",
        }
    }

    /// Look a frame up by its wire bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        [
            CommandFrame::CapturePhoto,
            CommandFrame::VideoStart,
            CommandFrame::VideoStop,
            CommandFrame::AudioStart,
            CommandFrame::AudioStop,
            CommandFrame::MediaCount,
        ]
        .into_iter()
        .find(|frame| frame.bytes() == bytes)
    }
}

impl std::fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex: Vec<String> = self.bytes().iter().map(|b| format!("0x{:02x}", b)).collect();
        write!(f, "{} [{}]", self.name(), hex.join(", "))
    }
}
