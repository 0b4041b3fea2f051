//! Provisioning pipeline: readiness probing, the configuration tool run,
//! and the per-machine driver that sequences them.
//!
//! A run's only outputs are the log lines and field writes it makes through
//! [`ProvisionStore`]; nothing is returned to the HTTP layer.

pub mod driver;
pub mod error;
pub mod progress;
pub mod prober;
pub mod runner;
pub mod store;

pub use driver::{ProvisionPipeline, RunMode};
pub use error::{PipelineError, StoreError};
pub use progress::{CollectedLines, ProgressLogger, ProgressSink};
pub use prober::{ProbePolicy, ReadinessProber};
pub use runner::{ConfigurationRunner, RunOutputs, RunnerConfig};
pub use store::{PgProvisionStore, ProvisionStore};
