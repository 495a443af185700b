//! API v0 endpoints.
//!
//! Version 0 signals an unstable API: breaking changes are expected until
//! the daemon reaches 1.0. Routes are served at the root.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tokio::sync::oneshot;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::commands::{AlarmCommand, CubeCommand};
use super::server::SharedState;
use crate::alarm::{Alarm, AlarmId, AlarmPatch, NewAlarm};
use crate::api_client::types::{
    ActiveAlarm, CubeStatus, StopResponse, SystemStatus, TriggerResponse,
};
use crate::broadcast::{Event, StopReason};
use crate::cube::LinkError;
use crate::machine::{MachineInput, StopOutcome, TriggerOutcome};
use crate::store::{AlarmStore, StoreError};
use crate::tracing::prelude::*;

/// How long a handler waits for an actor to answer a command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(get_status))
        .routes(routes!(list_alarms, create_alarm))
        .routes(routes!(get_active_alarm))
        .routes(routes!(stop_alarm))
        .routes(routes!(emergency_stop_alarm))
        .routes(routes!(get_alarm, update_alarm, delete_alarm))
        .routes(routes!(toggle_alarm))
        .routes(routes!(trigger_alarm))
        .routes(routes!(get_cube))
        .routes(routes!(cube_connect))
        .routes(routes!(cube_disconnect))
        .routes(routes!(cube_reset))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Return cube state, the active alarm and the alarm count.
#[utoipa::path(
    get,
    path = "/status",
    tag = "status",
    responses(
        (status = OK, description = "Daemon status", body = SystemStatus),
    ),
)]
async fn get_status(State(state): State<SharedState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        snapshot: state.broadcaster.snapshot(),
        alarm_count: state.store.len(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

/// Return all alarm definitions.
#[utoipa::path(
    get,
    path = "/alarms",
    tag = "alarms",
    responses(
        (status = OK, description = "All alarms", body = Vec<Alarm>),
    ),
)]
async fn list_alarms(State(state): State<SharedState>) -> Json<Vec<Alarm>> {
    Json(state.store.list())
}

/// Create an alarm.
#[utoipa::path(
    post,
    path = "/alarms",
    tag = "alarms",
    request_body = NewAlarm,
    responses(
        (status = CREATED, description = "Alarm created", body = Alarm),
        (status = BAD_REQUEST, description = "Malformed body"),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid time or day"),
        (status = CONFLICT, description = "Alarm id already exists"),
        (status = INTERNAL_SERVER_ERROR, description = "Alarm store write failed"),
    ),
)]
async fn create_alarm(
    State(state): State<SharedState>,
    Json(new): Json<NewAlarm>,
) -> Result<(StatusCode, Json<Alarm>), StatusCode> {
    let alarm = write_store(&state.store, move |store| store.create(new)).await?;
    info!(alarm = %alarm.id, time = %alarm.time, "Alarm created");
    state.broadcaster.publish(Event::AlarmCreated {
        alarm: alarm.clone(),
    });
    Ok((StatusCode::CREATED, Json(alarm)))
}

/// Return the ringing alarm, or null when idle.
#[utoipa::path(
    get,
    path = "/alarms/active",
    tag = "alarms",
    responses(
        (status = OK, description = "Active alarm or null", body = Option<ActiveAlarm>),
    ),
)]
async fn get_active_alarm(State(state): State<SharedState>) -> Json<Option<ActiveAlarm>> {
    Json(state.broadcaster.snapshot().active_alarm)
}

/// Stop the ringing alarm. Succeeds when nothing is ringing.
#[utoipa::path(
    post,
    path = "/alarms/stop",
    tag = "alarms",
    responses(
        (status = OK, description = "Stop result", body = StopResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Command channel error"),
    ),
)]
async fn stop_alarm(State(state): State<SharedState>) -> Result<Json<StopResponse>, StatusCode> {
    stop(&state, StopReason::Manual).await
}

/// Stop the ringing alarm, logged as an emergency.
#[utoipa::path(
    post,
    path = "/alarms/emergency-stop",
    tag = "alarms",
    responses(
        (status = OK, description = "Stop result", body = StopResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Command channel error"),
    ),
)]
async fn emergency_stop_alarm(
    State(state): State<SharedState>,
) -> Result<Json<StopResponse>, StatusCode> {
    stop(&state, StopReason::Emergency).await
}

async fn stop(state: &SharedState, reason: StopReason) -> Result<Json<StopResponse>, StatusCode> {
    let outcome = alarm_command(state, |reply| AlarmCommand::Stop { reason, reply }).await?;
    Ok(Json(StopResponse {
        stopped: matches!(outcome, StopOutcome::Stopped(_)),
        reason,
    }))
}

/// Return a single alarm by id, or 404 if not found.
#[utoipa::path(
    get,
    path = "/alarms/{id}",
    tag = "alarms",
    params(
        ("id" = String, Path, description = "Alarm id"),
    ),
    responses(
        (status = OK, description = "Alarm details", body = Alarm),
        (status = NOT_FOUND, description = "Alarm not found"),
    ),
)]
async fn get_alarm(
    State(state): State<SharedState>,
    Path(id): Path<AlarmId>,
) -> Result<Json<Alarm>, StatusCode> {
    state.store.get(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Apply a partial update to an alarm.
///
/// Disabling the alarm that is ringing does not stop it.
#[utoipa::path(
    put,
    path = "/alarms/{id}",
    tag = "alarms",
    params(
        ("id" = String, Path, description = "Alarm id"),
    ),
    request_body = AlarmPatch,
    responses(
        (status = OK, description = "Updated alarm", body = Alarm),
        (status = BAD_REQUEST, description = "Malformed body"),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid time or day"),
        (status = NOT_FOUND, description = "Alarm not found"),
        (status = INTERNAL_SERVER_ERROR, description = "Alarm store write failed"),
    ),
)]
async fn update_alarm(
    State(state): State<SharedState>,
    Path(id): Path<AlarmId>,
    Json(patch): Json<AlarmPatch>,
) -> Result<Json<Alarm>, StatusCode> {
    let alarm = write_store(&state.store, move |store| store.update(&id, patch)).await?;
    info!(alarm = %alarm.id, "Alarm updated");
    state.broadcaster.publish(Event::AlarmUpdated {
        alarm: alarm.clone(),
    });
    Ok(Json(alarm))
}

/// Delete an alarm. A ringing session of it keeps ringing.
#[utoipa::path(
    delete,
    path = "/alarms/{id}",
    tag = "alarms",
    params(
        ("id" = String, Path, description = "Alarm id"),
    ),
    responses(
        (status = OK, description = "Deleted alarm", body = Alarm),
        (status = NOT_FOUND, description = "Alarm not found"),
        (status = INTERNAL_SERVER_ERROR, description = "Alarm store write failed"),
    ),
)]
async fn delete_alarm(
    State(state): State<SharedState>,
    Path(id): Path<AlarmId>,
) -> Result<Json<Alarm>, StatusCode> {
    let alarm = write_store(&state.store, move |store| store.delete(&id)).await?;
    info!(alarm = %alarm.id, "Alarm deleted");
    state.broadcaster.publish(Event::AlarmDeleted {
        id: alarm.id.clone(),
    });
    Ok(Json(alarm))
}

/// Flip an alarm's `enabled` flag.
#[utoipa::path(
    post,
    path = "/alarms/{id}/toggle",
    tag = "alarms",
    params(
        ("id" = String, Path, description = "Alarm id"),
    ),
    responses(
        (status = OK, description = "Updated alarm", body = Alarm),
        (status = NOT_FOUND, description = "Alarm not found"),
        (status = INTERNAL_SERVER_ERROR, description = "Alarm store write failed"),
    ),
)]
async fn toggle_alarm(
    State(state): State<SharedState>,
    Path(id): Path<AlarmId>,
) -> Result<Json<Alarm>, StatusCode> {
    let alarm = write_store(&state.store, move |store| store.toggle(&id)).await?;
    info!(alarm = %alarm.id, enabled = alarm.enabled, "Alarm toggled");
    state.broadcaster.publish(Event::AlarmUpdated {
        alarm: alarm.clone(),
    });
    Ok(Json(alarm))
}

/// Ring an alarm now, ignoring its schedule and `enabled` flag.
#[utoipa::path(
    post,
    path = "/alarms/{id}/trigger",
    tag = "alarms",
    params(
        ("id" = String, Path, description = "Alarm id"),
    ),
    responses(
        (status = OK, description = "Trigger result", body = TriggerResponse),
        (status = NOT_FOUND, description = "Alarm not found"),
        (status = INTERNAL_SERVER_ERROR, description = "Command channel error"),
    ),
)]
async fn trigger_alarm(
    State(state): State<SharedState>,
    Path(id): Path<AlarmId>,
) -> Result<Json<TriggerResponse>, StatusCode> {
    let alarm = state.store.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    let outcome = alarm_command(&state, |reply| AlarmCommand::Trigger { alarm, reply }).await?;
    let response = match outcome {
        TriggerOutcome::Started(active) => TriggerResponse {
            started: true,
            active_alarm: Some(active),
        },
        TriggerOutcome::AlreadyRinging(active) => TriggerResponse {
            started: false,
            active_alarm: Some(active),
        },
    };
    Ok(Json(response))
}

/// Return the cube link state.
#[utoipa::path(
    get,
    path = "/cube",
    tag = "cube",
    responses(
        (status = OK, description = "Cube state", body = CubeStatus),
    ),
)]
async fn get_cube(State(state): State<SharedState>) -> Json<CubeStatus> {
    Json(state.broadcaster.snapshot().cube)
}

/// Bring the cube link up. Returns at once; progress arrives as events.
#[utoipa::path(
    post,
    path = "/cube/connect",
    tag = "cube",
    responses(
        (status = OK, description = "Cube state", body = CubeStatus),
        (status = SERVICE_UNAVAILABLE, description = "No cube transport configured"),
        (status = INTERNAL_SERVER_ERROR, description = "Command channel error"),
    ),
)]
async fn cube_connect(State(state): State<SharedState>) -> Result<Json<CubeStatus>, StatusCode> {
    cube_command(&state, |reply| CubeCommand::Connect { reply }).await
}

/// Tear the cube link down and stop reconnecting.
#[utoipa::path(
    post,
    path = "/cube/disconnect",
    tag = "cube",
    responses(
        (status = OK, description = "Cube state", body = CubeStatus),
        (status = INTERNAL_SERVER_ERROR, description = "Command channel error"),
    ),
)]
async fn cube_disconnect(
    State(state): State<SharedState>,
) -> Result<Json<CubeStatus>, StatusCode> {
    cube_command(&state, |reply| CubeCommand::Disconnect { reply }).await
}

/// Mark the cube solved without a physical solve.
#[utoipa::path(
    post,
    path = "/cube/reset",
    tag = "cube",
    responses(
        (status = OK, description = "Cube state", body = CubeStatus),
        (status = INTERNAL_SERVER_ERROR, description = "Command channel error"),
    ),
)]
async fn cube_reset(State(state): State<SharedState>) -> Result<Json<CubeStatus>, StatusCode> {
    cube_command(&state, |reply| CubeCommand::Reset { reply }).await
}

/// Send a command to the state machine and wait for its answer.
async fn alarm_command<T>(
    state: &SharedState,
    make: impl FnOnce(oneshot::Sender<T>) -> AlarmCommand,
) -> Result<T, StatusCode> {
    let (tx, rx) = oneshot::channel();
    state
        .machine_tx
        .send(MachineInput::Command(make(tx)))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    // Result layers: timeout / channel-closed.
    let Ok(Ok(outcome)) = tokio::time::timeout(COMMAND_TIMEOUT, rx).await else {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };
    Ok(outcome)
}

/// Send a command to the cube link and answer with the resulting state.
async fn cube_command(
    state: &SharedState,
    make: impl FnOnce(oneshot::Sender<Result<(), LinkError>>) -> CubeCommand,
) -> Result<Json<CubeStatus>, StatusCode> {
    let (tx, rx) = oneshot::channel();
    state
        .cube_cmd_tx
        .send(make(tx))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    // Result layers: timeout / channel-closed / command-error.
    match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
        Ok(Ok(Ok(()))) => Ok(Json(state.broadcaster.snapshot().cube)),
        Ok(Ok(Err(LinkError::NoTransport))) => Err(StatusCode::SERVICE_UNAVAILABLE),
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Cube command failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        _ => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Run a store mutation on the blocking pool. Mutations rewrite the store
/// file while holding the store lock.
async fn write_store<T, F>(store: &Arc<AlarmStore>, change: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&AlarmStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || change(&store))
        .await
        .map_err(|e| {
            error!(error = %e, "Alarm store task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(store_status)
}

fn store_status(e: StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Duplicate(_) => StatusCode::CONFLICT,
        StoreError::Io { .. } | StoreError::Format { .. } => {
            error!(error = %e, "Alarm store write failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
