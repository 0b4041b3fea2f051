pub mod health;
pub mod machines;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /machines                        list, create (GET, POST)
/// /machines/{id}                   get, delete (GET, DELETE)
/// /machines/{id}/logs?after=N      log entries after a cursor (GET)
/// /machines/{id}/reprovision       re-run the pipeline (POST)
/// /machines/{id}/ws                live log stream (WebSocket)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/machines", machines::router())
}
