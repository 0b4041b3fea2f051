//! Cloud provider integration.
//!
//! The provisioning pipeline only sees [`MachineProvider`]; creation is
//! complete (the machine has an address) before the pipeline starts.

pub mod hetzner;
pub mod provider;

pub use hetzner::{HetznerConfig, HetznerProvider};
pub use provider::{MachineProvider, ProviderError, ProvisionedMachine};
