//! Handlers for machine lifecycle: create, inspect, reprovision, delete.
//!
//! Creation and reprovisioning return as soon as the pipeline run has been
//! spawned; progress is observed through the log endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use creator_core::error::CoreError;
use creator_core::machine::{self, MachineStatus};
use creator_core::provision::ProvisionInputs;
use creator_core::types::DbId;
use creator_db::models::machine::{CreateMachine, Machine};
use creator_db::repositories::{MachineLogRepo, MachineRepo};
use creator_pipeline::{ProgressSink, RunMode};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /machines`. Run inputs sit at the top level next to the
/// optional name.
#[derive(Debug, Deserialize)]
pub struct CreateMachineRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub inputs: ProvisionInputs,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    /// Return entries with ids greater than this cursor.
    #[serde(default)]
    pub after: DbId,
}

#[derive(Debug, Serialize)]
pub struct DeletedMachine {
    pub id: DbId,
    pub deleted: bool,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn ensure_machine_exists(pool: &sqlx::PgPool, id: DbId) -> AppResult<Machine> {
    MachineRepo::find_by_id(pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Machine",
            id,
        }))
}

// ---------------------------------------------------------------------------
// POST /machines
// ---------------------------------------------------------------------------

/// Create a machine at the provider, record it, and start its pipeline.
pub async fn create_machine(
    State(state): State<AppState>,
    Json(input): Json<CreateMachineRequest>,
) -> AppResult<impl IntoResponse> {
    let name = match input.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            machine::validate_name(name)?;
            name.to_string()
        }
        _ => machine::random_name(),
    };

    let created = state.provider.create_machine(&name).await?;

    let record = MachineRepo::create(
        &state.pool,
        &CreateMachine {
            id: created.id,
            name: created.name.clone(),
            address: created.address.clone(),
            provider: state.provider.name().to_string(),
            provision_inputs: input.inputs.clone(),
        },
    )
    .await?;

    tracing::info!(
        machine_id = record.id,
        name = %record.name,
        address = %record.address,
        inputs = %input.inputs.describe(),
        "Machine created, starting provisioning",
    );

    let log = state.pipeline.logger(record.id);
    log.line("Creating server...").await;
    log.line(&format!("Server created: {} ({})", record.name, record.address))
        .await;

    state.pipeline.spawn(
        record.id,
        record.address.clone(),
        input.inputs,
        RunMode::Initial,
    );

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: record })))
}

// ---------------------------------------------------------------------------
// GET /machines
// ---------------------------------------------------------------------------

pub async fn list_machines(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let machines = MachineRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: machines }))
}

// ---------------------------------------------------------------------------
// GET /machines/{id}
// ---------------------------------------------------------------------------

pub async fn get_machine(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let machine = ensure_machine_exists(&state.pool, id).await?;
    Ok(Json(DataResponse { data: machine }))
}

// ---------------------------------------------------------------------------
// GET /machines/{id}/logs?after=N
// ---------------------------------------------------------------------------

/// Non-streaming log read for clients that cannot hold a WebSocket open.
pub async fn list_logs(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<LogQuery>,
) -> AppResult<impl IntoResponse> {
    ensure_machine_exists(&state.pool, id).await?;
    let entries = MachineLogRepo::entries_after(&state.pool, id, query.after.max(0)).await?;
    Ok(Json(DataResponse { data: entries }))
}

// ---------------------------------------------------------------------------
// POST /machines/{id}/reprovision
// ---------------------------------------------------------------------------

/// Re-run the pipeline against an existing machine.
///
/// Only machines in a terminal status are accepted; the status check and
/// the reset to `provisioning` are one conditional update, so concurrent
/// triggers cannot both start a run.
pub async fn reprovision_machine(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let Some(record) = MachineRepo::begin_reprovision(&state.pool, id).await? else {
        let current = ensure_machine_exists(&state.pool, id).await?;
        machine::ensure_can_reprovision(current.parsed_status()?)?;
        // Became terminal between the two reads; ask the caller to retry.
        return Err(AppError::Core(CoreError::Conflict(
            "Machine status changed, retry the request".into(),
        )));
    };

    tracing::info!(machine_id = id, "Reprovisioning machine");

    let started = state
        .pipeline
        .start_reprovision(id, record.address.clone(), record.provision_inputs.0.clone())
        .await;
    if let Err(e) = started {
        // Leave the machine terminal so the caller can try again.
        MachineRepo::set_status(&state.pool, id, MachineStatus::Failed).await?;
        state.hub.notify(id).await;
        return Err(e.into());
    }

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: record })))
}

// ---------------------------------------------------------------------------
// DELETE /machines/{id}
// ---------------------------------------------------------------------------

/// Delete the machine at the provider, then its record and log.
pub async fn delete_machine(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    ensure_machine_exists(&state.pool, id).await?;

    state.provider.delete_machine(id).await?;
    MachineRepo::delete(&state.pool, id).await?;
    state.hub.remove(id).await;

    tracing::info!(machine_id = id, "Machine deleted");

    Ok(Json(DataResponse {
        data: DeletedMachine { id, deleted: true },
    }))
}
