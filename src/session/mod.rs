//! Session wiring: owns every component for one run of the companion and
//! routes transport traffic between them.

mod actions;
mod orchestrator;
mod runtime;
mod shutdown;
mod types;


pub use orchestrator::GlassesSession;
pub use types::ShutdownReason;
