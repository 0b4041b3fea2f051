use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;

use creator_core::error::CoreError;
use creator_core::types::DbId;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::ws::session::LogSession;

/// HTTP handler that upgrades the connection to a log stream.
///
/// A malformed id is rejected with 400 and an unknown machine with 404,
/// both before the upgrade, so nothing is streamed for either.
pub async fn log_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Response> {
    let machine_id = parse_machine_id(&raw_id)?;
    let snapshot = state
        .store
        .snapshot(machine_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Machine",
            id: machine_id,
        }))?;

    let session = LogSession::new(
        machine_id,
        Arc::clone(&state.store),
        Arc::clone(&state.hub),
        state.shutdown.clone(),
    );
    Ok(ws.on_upgrade(move |socket| session.run(socket, snapshot)))
}

fn parse_machine_id(raw: &str) -> AppResult<DbId> {
    raw.parse::<DbId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid machine id: {raw}")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_numeric_ids() {
        assert_eq!(parse_machine_id("4711").unwrap(), 4711);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_matches!(parse_machine_id("abc"), Err(AppError::BadRequest(_)));
        assert_matches!(parse_machine_id("-3"), Err(AppError::BadRequest(_)));
        assert_matches!(parse_machine_id(""), Err(AppError::BadRequest(_)));
    }
}
