use std::sync::Arc;

use creator_cloud::MachineProvider;
use creator_events::LogHub;
use creator_pipeline::{ProvisionPipeline, ProvisionStore};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or is already a handle.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: creator_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Per-machine wake channels for log viewers.
    pub hub: Arc<LogHub>,
    /// Log store view shared with the pipeline.
    pub store: Arc<dyn ProvisionStore>,
    /// Cloud provider used to create and delete machines.
    pub provider: Arc<dyn MachineProvider>,
    pub pipeline: Arc<ProvisionPipeline>,
    /// Cancelled on server shutdown; ends every streaming session.
    pub shutdown: CancellationToken,
}
