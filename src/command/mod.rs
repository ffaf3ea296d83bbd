//! Control commands sent to the glasses and their responses.

pub mod dispatcher;
pub mod frame;
pub mod response;
pub mod toggle;

#[cfg(test)]
mod tests;

pub use dispatcher::CommandDispatcher;
pub use frame::CommandFrame;
pub use response::{CommandResponse, DeviceInfo, MediaCounts};
pub use toggle::{ModeToggle, ToggleState};
