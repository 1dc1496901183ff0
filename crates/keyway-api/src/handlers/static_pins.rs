//! Handlers for the `/static-pins` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use keyway_core::error::CoreError;
use keyway_core::schedule::is_valid_hhmm;
use keyway_core::types::DbId;
use keyway_db::models::static_pin::{CreateStaticPin, StaticPinSchedule, UpdateStaticPin};
use keyway_db::repositories::StaticPinRepo;
use keyway_locks::Owner;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

fn validate_code(code: &str) -> Result<(), CoreError> {
    if !(4..=8).contains(&code.len()) || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::Validation(
            "pin_code must be 4-8 digits".to_string(),
        ));
    }
    Ok(())
}

fn validate_schedules(schedules: &[StaticPinSchedule]) -> Result<(), CoreError> {
    for schedule in schedules {
        if !(0..=6).contains(&schedule.day_of_week) {
            return Err(CoreError::Validation(
                "day_of_week must be 0 (Sunday) through 6 (Saturday)".to_string(),
            ));
        }
        if !is_valid_hhmm(&schedule.start_time) || !is_valid_hhmm(&schedule.end_time) {
            return Err(CoreError::Validation(
                "schedule times must be zero-padded 24-hour HH:MM".to_string(),
            ));
        }
    }
    Ok(())
}

/// Re-evaluate schedules shortly after a mutation so edges apply without
/// waiting for the next minute tick.
fn trigger_evaluation(state: &AppState) {
    let evaluator = state.evaluator.clone();
    tokio::spawn(async move {
        if let Err(e) = evaluator.evaluate_now().await {
            tracing::error!(error = %e, "Post-mutation schedule evaluation failed");
        }
    });
}

/// GET /api/static-pins
pub async fn list_static_pins(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let pins = StaticPinRepo::list_detail(&state.pool).await?;
    Ok(Json(DataResponse { data: pins }))
}

/// GET /api/static-pins/{id}
pub async fn get_static_pin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let detail = StaticPinRepo::find_detail(&state.pool, &id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "StaticPin",
            id,
        }))?;
    Ok(Json(DataResponse { data: detail }))
}

/// POST /api/static-pins
pub async fn create_static_pin(
    State(state): State<AppState>,
    Json(input): Json<CreateStaticPin>,
) -> AppResult<impl IntoResponse> {
    if input.name.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "name is required".to_string(),
        )));
    }
    validate_code(&input.pin_code)?;
    validate_schedules(&input.schedules)?;

    let pin = StaticPinRepo::create(&state.pool, &input).await?;
    tracing::info!(pin_id = %pin.id, name = %pin.name, "Static PIN created");
    trigger_evaluation(&state);

    Ok((StatusCode::CREATED, Json(DataResponse { data: pin })))
}

/// PUT /api/static-pins/{id}
pub async fn update_static_pin(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateStaticPin>,
) -> AppResult<impl IntoResponse> {
    if let Some(code) = &patch.pin_code {
        validate_code(code)?;
    }
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(AppError::Core(CoreError::Validation(
                "name must not be empty".to_string(),
            )));
        }
    }

    let pin = StaticPinRepo::update(&state.pool, &id, &patch).await?;

    // A changed code must reach the locks where the PIN is resident.
    if patch.pin_code.is_some() {
        StaticPinRepo::mark_assignments_pending(&state.pool, &id).await?;
    }
    trigger_evaluation(&state);

    Ok(Json(DataResponse { data: pin }))
}

/// DELETE /api/static-pins/{id}
///
/// Clears any resident codes before the rows cascade away.
pub async fn delete_static_pin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    for assignment in StaticPinRepo::assignments(&state.pool, &id).await? {
        if assignment.sync_status == "synced" {
            state
                .writer
                .queue_clear(&assignment.lock_id, assignment.slot_number, Owner::Static(id.clone()));
        }
    }

    StaticPinRepo::delete(&state.pool, &id).await?;
    tracing::info!(pin_id = %id, "Static PIN deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SetSchedulesRequest {
    pub schedules: Vec<StaticPinSchedule>,
}

/// PUT /api/static-pins/{id}/schedules
pub async fn set_static_pin_schedules(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SetSchedulesRequest>,
) -> AppResult<impl IntoResponse> {
    StaticPinRepo::find_by_id(&state.pool, &id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "StaticPin",
            id: id.clone(),
        }))?;
    validate_schedules(&input.schedules)?;

    StaticPinRepo::set_schedules(&state.pool, &id, &input.schedules).await?;
    trigger_evaluation(&state);

    let schedules = StaticPinRepo::schedules(&state.pool, &id).await?;
    Ok(Json(DataResponse { data: schedules }))
}

#[derive(Debug, Deserialize)]
pub struct SetLocksRequest {
    pub lock_ids: Vec<DbId>,
}

/// PUT /api/static-pins/{id}/locks
///
/// Replace lock assignments; slot occupancy is checked by the store.
pub async fn set_static_pin_locks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SetLocksRequest>,
) -> AppResult<impl IntoResponse> {
    StaticPinRepo::set_lock_ids(&state.pool, &id, &input.lock_ids).await?;
    trigger_evaluation(&state);

    let assignments = StaticPinRepo::assignments(&state.pool, &id).await?;
    Ok(Json(DataResponse { data: assignments }))
}
