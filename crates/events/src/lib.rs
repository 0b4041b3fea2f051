//! In-process wake-up signalling between provisioning runs and log viewers.

pub mod hub;

pub use hub::{LogHub, WakeHandle};
