//! Connection/readiness state machine for the glasses link.

pub mod machine;
pub mod state;

#[cfg(test)]
mod tests;

pub use machine::ConnectionStateMachine;
pub use state::{sort_scan_results, DeviceIdentity, DiscoveredDevice, LinkSnapshot, LinkState};
