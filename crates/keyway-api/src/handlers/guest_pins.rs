//! Handlers for the `/guest-pins` resource.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use keyway_core::error::CoreError;
use keyway_core::pin::{GenerationMethod, PinGenerator, PinStatus};
use keyway_core::settings::{keys, parse_pin_lengths};
use keyway_core::types::CalendarEvent;
use keyway_db::models::guest_pin::{GuestPin, GuestPinWithLocks};
use keyway_db::repositories::{GuestPinRepo, SettingsRepo};
use keyway_engine::conflict;
use keyway_events::{types as event_types, EngineEvent};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

async fn require_pin(state: &AppState, id: &str) -> AppResult<GuestPin> {
    GuestPinRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "GuestPin",
            id: id.to_string(),
        }))
}

async fn generator_from_settings(state: &AppState) -> AppResult<PinGenerator> {
    let min = SettingsRepo::get_or(&state.pool, keys::MIN_PIN_LENGTH, "4").await?;
    let max = SettingsRepo::get_or(&state.pool, keys::MAX_PIN_LENGTH, "8").await?;
    let (min, max) = parse_pin_lengths(&min, &max);
    Ok(PinGenerator::new(min, max))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub calendar_id: Option<String>,
    pub status: Option<String>,
}

/// GET /api/guest-pins
///
/// Optional `calendar_id` and `status` filters.
pub async fn list_guest_pins(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let pins = match (&query.calendar_id, &query.status) {
        (Some(calendar_id), _) => GuestPinRepo::list_by_calendar(&state.pool, calendar_id).await?,
        (None, Some(status)) => GuestPinRepo::list_by_status(&state.pool, status).await?,
        (None, None) => GuestPinRepo::list(&state.pool).await?,
    };

    let pins = match &query.status {
        Some(status) if query.calendar_id.is_some() => pins
            .into_iter()
            .filter(|p| &p.status == status)
            .collect(),
        _ => pins,
    };

    Ok(Json(DataResponse { data: pins }))
}

/// GET /api/guest-pins/{id}
pub async fn get_guest_pin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let pin = require_pin(&state, &id).await?;
    let locks = GuestPinRepo::assignments(&state.pool, &id).await?;
    Ok(Json(DataResponse {
        data: GuestPinWithLocks { pin, locks },
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGuestPin {
    pub custom_pin: Option<String>,
    pub status: Option<String>,
}

/// PUT /api/guest-pins/{id}
///
/// Set a custom code (validated and conflict-checked) and/or force a
/// status. Status transitions respect monotonicity: an expired PIN stays
/// expired and an active PIN never goes back to pending.
pub async fn update_guest_pin(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateGuestPin>,
) -> AppResult<impl IntoResponse> {
    let pin = require_pin(&state, &id).await?;

    if let Some(custom) = &input.custom_pin {
        let generator = generator_from_settings(&state).await?;
        generator.validate(custom)?;

        let conflicts =
            conflict::check_conflicts(&state.pool, custom, pin.valid_from, pin.valid_until, &id)
                .await?;
        if !conflicts.is_empty() {
            return Err(AppError::Core(CoreError::Conflict(
                "the requested code conflicts with another PIN in the same window".to_string(),
            )));
        }

        GuestPinRepo::update_code(
            &state.pool,
            &id,
            custom,
            GenerationMethod::Custom.as_str(),
            Some(custom),
        )
        .await?;
        GuestPinRepo::mark_assignments_pending(&state.pool, &id).await?;
    }

    if let Some(status) = &input.status {
        let new_status = match status.as_str() {
            "pending" => PinStatus::Pending,
            "active" => PinStatus::Active,
            "expired" => PinStatus::Expired,
            _ => {
                return Err(AppError::Core(CoreError::Validation(
                    "status must be pending, active, or expired".to_string(),
                )))
            }
        };

        let old_status = pin.status.as_str();
        let monotonic = match (old_status, new_status) {
            ("expired", _) => false,
            ("active", PinStatus::Pending) => false,
            _ => true,
        };
        if !monotonic {
            return Err(AppError::Core(CoreError::Conflict(format!(
                "cannot move a {old_status} PIN to {new_status}"
            ))));
        }

        GuestPinRepo::update_status(&state.pool, &id, new_status.as_str()).await?;
        GuestPinRepo::mark_assignments_pending(&state.pool, &id).await?;

        state.bus.publish(
            EngineEvent::new(event_types::PIN_STATUS_CHANGED)
                .with_source("guest_pin", id.clone())
                .with_payload(serde_json::json!({
                    "pin_id": id,
                    "pin_type": "guest",
                    "old_status": old_status,
                    "new_status": new_status.as_str(),
                })),
        );
    }

    let updated = require_pin(&state, &id).await?;
    Ok(Json(DataResponse { data: updated }))
}

/// POST /api/guest-pins/{id}/regenerate
///
/// Derive a fresh code with the next strategy in the chain. Only allowed
/// while check-in is at least a day away.
pub async fn regenerate_guest_pin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let pin = require_pin(&state, &id).await?;

    if !pin.can_regenerate(Utc::now()) {
        return Err(AppError::Core(CoreError::Conflict(
            "PIN is not eligible for regeneration".to_string(),
        )));
    }

    let current = GenerationMethod::parse(&pin.generation_method)
        .unwrap_or(GenerationMethod::DateBased);

    // The source event's description is not persisted, so regeneration
    // works from the stored fields; the chain bottoms out at date-based.
    let event = CalendarEvent {
        uid: pin.event_uid.clone(),
        summary: pin.event_summary.clone().unwrap_or_default(),
        description: String::new(),
        location: None,
        dt_start: pin.valid_from,
        dt_end: pin.valid_until,
    };

    let generator = generator_from_settings(&state).await?;
    let derivation = generator.regenerate(&event, current);

    GuestPinRepo::update_code(
        &state.pool,
        &id,
        &derivation.code,
        derivation.method.as_str(),
        None,
    )
    .await?;
    GuestPinRepo::mark_assignments_pending(&state.pool, &id).await?;

    let updated = require_pin(&state, &id).await?;
    Ok(Json(DataResponse { data: updated }))
}

/// GET /api/guest-pins/{id}/conflicts
pub async fn get_guest_pin_conflicts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let pin = require_pin(&state, &id).await?;
    let conflicts = conflict::check_conflicts(
        &state.pool,
        &pin.pin_code,
        pin.valid_from,
        pin.valid_until,
        &id,
    )
    .await?;
    Ok(Json(DataResponse { data: conflicts }))
}

/// GET /api/guest-pins/{id}/alternative
///
/// A conflict-free replacement code within ten increments, if any.
pub async fn get_guest_pin_alternative(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let pin = require_pin(&state, &id).await?;
    let alternative =
        conflict::find_alternative(&state.pool, &pin.pin_code, pin.valid_from, pin.valid_until)
            .await?;
    Ok(Json(DataResponse {
        data: serde_json::json!({ "alternative": alternative }),
    }))
}
