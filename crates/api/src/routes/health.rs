//! Liveness endpoint, mounted at the root rather than under `/api/v1`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok`, or `degraded` when the database cannot be reached.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Machines with at least one live viewer channel.
    pub streaming_machines: usize,
    /// True once shutdown has begun; load balancers should stop routing here.
    pub draining: bool,
}

/// A degraded or draining instance answers 503 so it drops out of rotation.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let db_healthy = creator_db::health_check(&state.pool).await.is_ok();
    let draining = state.shutdown.is_cancelled();

    let code = if db_healthy && !draining {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let report = HealthReport {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        streaming_machines: state.hub.channel_count().await,
        draining,
    };
    (code, Json(report))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
