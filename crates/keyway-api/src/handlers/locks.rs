//! Handlers for the `/locks` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use keyway_core::error::CoreError;
use keyway_db::models::lock::{direct_integration, protocol, CreateLock, UpdateLock};
use keyway_db::repositories::LockRepo;
use keyway_locks::discovery;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

fn validate_create(input: &CreateLock) -> Result<(), CoreError> {
    if input.entity_id.trim().is_empty() {
        return Err(CoreError::Validation("entity_id is required".to_string()));
    }
    if input.name.trim().is_empty() {
        return Err(CoreError::Validation("name is required".to_string()));
    }
    if !protocol::is_valid(&input.protocol) {
        return Err(CoreError::Validation(format!(
            "invalid protocol: {}",
            input.protocol
        )));
    }
    if let Some(direct) = &input.direct_integration {
        if !direct_integration::is_valid(direct) {
            return Err(CoreError::Validation(format!(
                "invalid direct_integration: {direct}"
            )));
        }
    }
    validate_budgets(input.total_slots, input.guest_slots, input.static_slots)
}

fn validate_budgets(total: i64, guest: i64, static_slots: i64) -> Result<(), CoreError> {
    if total < 1 {
        return Err(CoreError::Validation(
            "total_slots must be positive".to_string(),
        ));
    }
    if guest < 0 || static_slots < 0 {
        return Err(CoreError::Validation(
            "slot budgets must be non-negative".to_string(),
        ));
    }
    if guest + static_slots > total {
        return Err(CoreError::Validation(format!(
            "guest_slots + static_slots ({}) exceeds total_slots ({total})",
            guest + static_slots
        )));
    }
    Ok(())
}

/// GET /api/locks
pub async fn list_locks(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let locks = LockRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: locks }))
}

/// GET /api/locks/{id}
pub async fn get_lock(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let lock = LockRepo::find_by_id(&state.pool, &id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "ManagedLock",
            id,
        }))?;
    Ok(Json(DataResponse { data: lock }))
}

/// POST /api/locks
///
/// Import a lock, typically from a discovery result.
pub async fn create_lock(
    State(state): State<AppState>,
    Json(input): Json<CreateLock>,
) -> AppResult<impl IntoResponse> {
    validate_create(&input)?;
    let lock = LockRepo::create(&state.pool, &input).await?;
    tracing::info!(lock_id = %lock.id, entity_id = %lock.entity_id, "Lock created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: lock })))
}

/// PUT /api/locks/{id}
pub async fn update_lock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateLock>,
) -> AppResult<impl IntoResponse> {
    let existing = LockRepo::find_by_id(&state.pool, &id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "ManagedLock",
            id: id.clone(),
        }))?;

    if let Some(Some(direct)) = &patch.direct_integration {
        if !direct_integration::is_valid(direct) {
            return Err(AppError::Core(CoreError::Validation(format!(
                "invalid direct_integration: {direct}"
            ))));
        }
    }
    validate_budgets(
        patch.total_slots.unwrap_or(existing.total_slots),
        patch.guest_slots.unwrap_or(existing.guest_slots),
        patch.static_slots.unwrap_or(existing.static_slots),
    )?;

    let lock = LockRepo::update(&state.pool, &id, &patch).await?;
    Ok(Json(DataResponse { data: lock }))
}

/// DELETE /api/locks/{id}
///
/// Deletes the lock and all of its assignments.
pub async fn delete_lock(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    LockRepo::delete(&state.pool, &id).await?;
    tracing::info!(lock_id = %id, "Lock deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/locks/discover
///
/// Enumerate lock entities from Home Assistant.
pub async fn discover_locks(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let discovered = discovery::discover_locks(&state.pool, &state.ha)
        .await
        .map_err(|e| AppError::InternalError(format!("discovery failed: {e}")))?;
    Ok(Json(DataResponse { data: discovered }))
}

/// POST /api/locks/refresh
///
/// Refresh online/battery/state for every managed lock.
pub async fn refresh_locks(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    discovery::refresh_lock_status(&state.pool, &state.ha, &state.bus)
        .await
        .map_err(|e| AppError::InternalError(format!("status refresh failed: {e}")))?;
    let locks = LockRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: locks }))
}
