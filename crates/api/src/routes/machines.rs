use axum::routing::{get, post};
use axum::Router;

use crate::handlers::machines;
use crate::state::AppState;
use crate::ws;

/// Machine routes, mounted at `/machines`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(machines::list_machines).post(machines::create_machine))
        .route(
            "/{id}",
            get(machines::get_machine).delete(machines::delete_machine),
        )
        .route("/{id}/logs", get(machines::list_logs))
        .route("/{id}/reprovision", post(machines::reprovision_machine))
        .route("/{id}/ws", get(ws::log_stream_handler))
}
