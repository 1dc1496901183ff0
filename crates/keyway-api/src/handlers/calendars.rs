//! Handlers for the `/calendars` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use keyway_core::error::CoreError;
use keyway_core::types::DbId;
use keyway_db::models::calendar::{CreateCalendar, UpdateCalendar};
use keyway_db::repositories::{CalendarRepo, GuestPinRepo, LockRepo};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Minimum accepted sync interval.
const MIN_SYNC_INTERVAL_MIN: i64 = 5;

fn validate_feed(name: &str, url: &str, interval_min: i64) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation("name is required".to_string()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(CoreError::Validation(
            "url must be an http(s) iCal feed".to_string(),
        ));
    }
    if interval_min < MIN_SYNC_INTERVAL_MIN {
        return Err(CoreError::Validation(format!(
            "sync_interval_min must be at least {MIN_SYNC_INTERVAL_MIN}"
        )));
    }
    Ok(())
}

async fn require_calendar(
    state: &AppState,
    id: &str,
) -> AppResult<keyway_db::models::calendar::CalendarSubscription> {
    CalendarRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "CalendarSubscription",
            id: id.to_string(),
        }))
}

/// GET /api/calendars
pub async fn list_calendars(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let calendars = CalendarRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: calendars }))
}

/// GET /api/calendars/{id}
pub async fn get_calendar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let calendar = require_calendar(&state, &id).await?;
    Ok(Json(DataResponse { data: calendar }))
}

/// POST /api/calendars
///
/// Create a subscription with its lock mappings and plan its sync task.
pub async fn create_calendar(
    State(state): State<AppState>,
    Json(input): Json<CreateCalendar>,
) -> AppResult<impl IntoResponse> {
    validate_feed(&input.name, &input.url, input.sync_interval_min)?;
    for lock_id in &input.lock_ids {
        if LockRepo::find_by_id(&state.pool, lock_id).await?.is_none() {
            return Err(AppError::Core(CoreError::NotFound {
                entity: "ManagedLock",
                id: lock_id.clone(),
            }));
        }
    }

    let calendar = CalendarRepo::create(&state.pool, &input).await?;
    state.scheduler.schedule_calendar(&calendar);
    state.scheduler.trigger_sync(&calendar.id);
    tracing::info!(calendar_id = %calendar.id, "Calendar created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: calendar })))
}

/// PUT /api/calendars/{id}
///
/// Update a subscription and re-plan its sync task.
pub async fn update_calendar(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateCalendar>,
) -> AppResult<impl IntoResponse> {
    let existing = require_calendar(&state, &id).await?;
    validate_feed(
        patch.name.as_ref().unwrap_or(&existing.name),
        patch.url.as_ref().unwrap_or(&existing.url),
        patch.sync_interval_min.unwrap_or(existing.sync_interval_min),
    )?;

    let calendar = CalendarRepo::update(&state.pool, &id, &patch).await?;
    state.scheduler.schedule_calendar(&calendar);

    Ok(Json(DataResponse { data: calendar }))
}

/// DELETE /api/calendars/{id}
///
/// Unschedules the sync task; guest PINs and assignments cascade.
pub async fn delete_calendar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    // Clear codes still resident on locks before the rows cascade away.
    for pin in GuestPinRepo::list_by_calendar(&state.pool, &id).await? {
        for assignment in GuestPinRepo::assignments(&state.pool, &pin.id).await? {
            if assignment.slot_number >= 1 && assignment.sync_status == "synced" {
                state.writer.queue_clear(
                    &assignment.lock_id,
                    assignment.slot_number,
                    keyway_locks::Owner::Guest(pin.id.clone()),
                );
            }
        }
    }

    state.scheduler.unschedule_calendar(&id);
    CalendarRepo::delete(&state.pool, &id).await?;
    tracing::info!(calendar_id = %id, "Calendar deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/calendars/{id}/sync
///
/// Trigger a manual sync; the run happens asynchronously.
pub async fn sync_calendar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    require_calendar(&state, &id).await?;
    state.scheduler.trigger_sync(&id);
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "data": { "calendar_id": id, "status": "sync_started" } })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SetLocksRequest {
    pub lock_ids: Vec<DbId>,
}

/// PUT /api/calendars/{id}/locks
///
/// Replace the lock mappings transactionally.
pub async fn set_calendar_locks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SetLocksRequest>,
) -> AppResult<impl IntoResponse> {
    require_calendar(&state, &id).await?;
    for lock_id in &input.lock_ids {
        if LockRepo::find_by_id(&state.pool, lock_id).await?.is_none() {
            return Err(AppError::Core(CoreError::NotFound {
                entity: "ManagedLock",
                id: lock_id.clone(),
            }));
        }
    }

    CalendarRepo::set_lock_ids(&state.pool, &id, &input.lock_ids).await?;
    Ok(Json(DataResponse {
        data: input.lock_ids,
    }))
}

/// GET /api/calendars/{id}/locks
pub async fn get_calendar_locks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    require_calendar(&state, &id).await?;
    let lock_ids = CalendarRepo::lock_ids(&state.pool, &id).await?;
    Ok(Json(DataResponse { data: lock_ids }))
}

/// GET /api/calendars/{id}/pins
pub async fn get_calendar_pins(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    require_calendar(&state, &id).await?;
    let pins = GuestPinRepo::list_by_calendar(&state.pool, &id).await?;
    Ok(Json(DataResponse { data: pins }))
}
