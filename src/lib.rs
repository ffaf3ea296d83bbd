pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod keyboard_input;
pub mod link;
pub mod notification;
pub mod session;
pub mod settings;
pub mod transport;
pub mod upload;

pub use command::{CommandDispatcher, CommandFrame, CommandResponse, DeviceInfo, MediaCounts};
pub use config::GlassesConfig;
pub use error::{
    CommandError, GlassesError, LinkError, Result, TransportError, UploadError,
};
pub use events::{EventBus, EventFilter, EventReceiver, GlassesEvent};
pub use keyboard_input::{ConsoleAction, KeyboardConsole};
pub use link::{ConnectionStateMachine, DeviceIdentity, LinkSnapshot, LinkState};
pub use notification::DeviceEvent;
pub use session::{GlassesSession, ShutdownReason};
pub use settings::{FileSettingsStore, MemorySettingsStore, SettingsStore, UploadSettings};
pub use transport::{LinkTransport, SimulatedTransport, TransportEvent};
pub use upload::{HttpPhotoUploader, PhotoUploader, UploadAttempt, UploadPipeline};
