//! The calendar sync pipeline.
//!
//! One run per calendar: fetch and parse the feed, drop past events,
//! upsert a guest PIN per event, and expire PINs whose events vanished.
//! Lock writes are not emitted here; newly pending assignments are picked
//! up by the status scheduler's drain sweep.

use std::sync::Arc;

use chrono::Utc;
use keyway_core::pin::{GenerationMethod, PinGenerator, PinStatus};
use keyway_core::settings::{self, keys};
use keyway_core::types::CalendarEvent;
use keyway_core::window;
use keyway_db::models::calendar::{CalendarSubscription, SyncResult};
use keyway_db::models::calendar_sync_status;
use keyway_db::models::guest_pin::NewGuestPin;
use keyway_db::repositories::{CalendarRepo, GuestPinRepo, SettingsRepo};
use keyway_db::{DbPool, StoreError};
use keyway_events::{types as event_types, EngineEvent, EventBus};
use tokio_util::sync::CancellationToken;

use crate::feed::{FeedError, FeedSource};

/// Errors that abort a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("calendar not found: {0}")]
    CalendarNotFound(String),

    #[error(transparent)]
    Fetch(#[from] FeedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("sync cancelled")]
    Cancelled,
}

/// Per-run settings snapshot.
struct SyncSettings {
    checkin_time: String,
    checkout_time: String,
    generator: PinGenerator,
}

/// Runs calendar syncs against the store.
pub struct SyncService<F: FeedSource> {
    pool: DbPool,
    feed: F,
    bus: Arc<EventBus>,
}

impl<F: FeedSource> SyncService<F> {
    pub fn new(pool: DbPool, feed: F, bus: Arc<EventBus>) -> Self {
        Self { pool, feed, bus }
    }

    /// Synchronise a single calendar.
    ///
    /// The cancellation token is honoured at each external boundary;
    /// already-committed partial work is not rolled back.
    pub async fn sync_calendar(
        &self,
        calendar_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, SyncError> {
        let calendar = CalendarRepo::find_by_id(&self.pool, calendar_id)
            .await?
            .ok_or_else(|| SyncError::CalendarNotFound(calendar_id.to_string()))?;

        CalendarRepo::update_sync_status(
            &self.pool,
            calendar_id,
            calendar_sync_status::SYNCING,
            None,
        )
        .await?;

        match self.run(&calendar, cancel).await {
            Ok(result) => {
                CalendarRepo::update_sync_status(
                    &self.pool,
                    calendar_id,
                    calendar_sync_status::SUCCESS,
                    None,
                )
                .await?;

                self.bus.publish(
                    EngineEvent::new(event_types::CALENDAR_SYNC_COMPLETED)
                        .with_source("calendar", calendar_id)
                        .with_payload(serde_json::json!({
                            "calendar_id": result.calendar_id,
                            "calendar_name": result.calendar_name,
                            "events_found": result.events_found,
                            "pins_created": result.pins_created,
                            "pins_updated": result.pins_updated,
                            "pins_removed": result.pins_removed,
                        })),
                );
                Ok(result)
            }
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(err) => {
                let message = err.to_string();
                CalendarRepo::update_sync_status(
                    &self.pool,
                    calendar_id,
                    calendar_sync_status::ERROR,
                    Some(&message),
                )
                .await?;

                self.bus.publish(
                    EngineEvent::new(event_types::CALENDAR_SYNC_ERROR)
                        .with_source("calendar", calendar_id)
                        .with_payload(serde_json::json!({
                            "calendar_id": calendar_id,
                            "calendar_name": calendar.name,
                            "message": message,
                        })),
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        calendar: &CalendarSubscription,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, SyncError> {
        let mut result = SyncResult {
            calendar_id: calendar.id.clone(),
            calendar_name: calendar.name.clone(),
            events_found: 0,
            pins_created: 0,
            pins_updated: 0,
            pins_removed: 0,
            event_errors: Vec::new(),
            synced_at: Utc::now(),
        };

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let events = self.feed.fetch(&calendar.url).await?;
        result.events_found = events.len();

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // Past events are ignored.
        let now = Utc::now();
        let events: Vec<CalendarEvent> =
            events.into_iter().filter(|e| e.dt_end > now).collect();

        let lock_ids = CalendarRepo::lock_ids(&self.pool, &calendar.id).await?;
        let settings = self.load_settings().await?;

        for event in &events {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self
                .process_event(&calendar.id, event, &lock_ids, &settings)
                .await
            {
                Ok(EventOutcome::Created) => result.pins_created += 1,
                Ok(EventOutcome::Updated) => result.pins_updated += 1,
                Ok(EventOutcome::Unchanged) => {}
                Err(e) => {
                    tracing::warn!(
                        calendar_id = %calendar.id,
                        event_uid = %event.uid,
                        error = %e,
                        "Event processing failed"
                    );
                    result.event_errors.push(format!("{}: {e}", event.uid));
                }
            }
        }

        result.pins_removed = self
            .expire_dropped_events(&calendar.id, &events, cancel)
            .await?;

        Ok(result)
    }

    async fn load_settings(&self) -> Result<SyncSettings, StoreError> {
        let checkin_time = SettingsRepo::get_or(
            &self.pool,
            keys::CHECKIN_TIME,
            settings::defaults::CHECKIN_TIME,
        )
        .await?;
        let checkout_time = SettingsRepo::get_or(
            &self.pool,
            keys::CHECKOUT_TIME,
            settings::defaults::CHECKOUT_TIME,
        )
        .await?;
        let min = SettingsRepo::get_or(&self.pool, keys::MIN_PIN_LENGTH, "4").await?;
        let max = SettingsRepo::get_or(&self.pool, keys::MAX_PIN_LENGTH, "8").await?;
        let (min, max) = settings::parse_pin_lengths(&min, &max);

        Ok(SyncSettings {
            checkin_time,
            checkout_time,
            generator: PinGenerator::new(min, max),
        })
    }

    async fn process_event(
        &self,
        calendar_id: &str,
        event: &CalendarEvent,
        lock_ids: &[String],
        settings: &SyncSettings,
    ) -> Result<EventOutcome, SyncError> {
        let valid_from = window::apply_checkin_time(event.dt_start, &settings.checkin_time);
        let valid_until = window::apply_checkout_time(event.dt_end, &settings.checkout_time);

        if let Some(existing) =
            GuestPinRepo::find_by_event(&self.pool, calendar_id, &event.uid).await?
        {
            if existing.valid_from == valid_from && existing.valid_until == valid_until {
                return Ok(EventOutcome::Unchanged);
            }

            // The date inputs changed, so a date-based code is re-derived;
            // every other method preserves the code the guest already has.
            let (code, method) =
                if existing.generation_method == GenerationMethod::DateBased.as_str() {
                    let derivation = settings.generator.derive(event, None);
                    (derivation.code, derivation.method.as_str().to_string())
                } else {
                    (existing.pin_code.clone(), existing.generation_method.clone())
                };

            GuestPinRepo::update_window(
                &self.pool,
                &existing.id,
                valid_from,
                valid_until,
                Some(&event.summary),
                &code,
                &method,
            )
            .await?;
            return Ok(EventOutcome::Updated);
        }

        let derivation = settings.generator.derive(event, None);

        let conflicts = GuestPinRepo::find_conflicts(
            &self.pool,
            &derivation.code,
            valid_from,
            valid_until,
            "",
        )
        .await?;

        let status = if !conflicts.is_empty() {
            PinStatus::Conflict
        } else if window::window_contains(valid_from, valid_until, Utc::now()) {
            PinStatus::Active
        } else {
            PinStatus::Pending
        };

        let pin = GuestPinRepo::create(
            &self.pool,
            &NewGuestPin {
                calendar_id: calendar_id.to_string(),
                event_uid: event.uid.clone(),
                event_summary: Some(event.summary.clone()),
                pin_code: derivation.code,
                generation_method: derivation.method.as_str().to_string(),
                custom_pin: None,
                valid_from,
                valid_until,
                status: status.as_str().to_string(),
                regeneration_eligible: true,
            },
        )
        .await?;

        if status == PinStatus::Conflict {
            // Conflicted PINs get no slots and no lock writes; resolution
            // is a user action.
            self.bus.publish(
                EngineEvent::new(event_types::PIN_CONFLICT_DETECTED)
                    .with_source("guest_pin", pin.id.clone())
                    .with_payload(serde_json::json!({
                        "pin_id": pin.id,
                        "conflicting_pin_ids":
                            conflicts.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
                    })),
            );
            return Ok(EventOutcome::Created);
        }

        for lock_id in lock_ids {
            match GuestPinRepo::assign_to_lock(&self.pool, &pin.id, lock_id).await {
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        pin_id = %pin.id,
                        lock_id = %lock_id,
                        error = %e,
                        "Lock assignment failed"
                    );
                }
            }
        }

        Ok(EventOutcome::Created)
    }

    /// Expire PINs whose events no longer appear in the feed, and mark
    /// their assignments pending so the drain sweep clears the codes.
    async fn expire_dropped_events(
        &self,
        calendar_id: &str,
        events: &[CalendarEvent],
        cancel: &CancellationToken,
    ) -> Result<usize, SyncError> {
        let current: std::collections::HashSet<&str> =
            events.iter().map(|e| e.uid.as_str()).collect();

        let mut removed = 0;
        for pin in GuestPinRepo::list_by_calendar(&self.pool, calendar_id).await? {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if current.contains(pin.event_uid.as_str())
                || pin.status == PinStatus::Expired.as_str()
            {
                continue;
            }

            let old_status = pin.status.clone();
            GuestPinRepo::update_status(&self.pool, &pin.id, PinStatus::Expired.as_str()).await?;
            GuestPinRepo::mark_assignments_pending(&self.pool, &pin.id).await?;
            removed += 1;

            self.bus.publish(
                EngineEvent::new(event_types::PIN_STATUS_CHANGED)
                    .with_source("guest_pin", pin.id.clone())
                    .with_payload(serde_json::json!({
                        "pin_id": pin.id,
                        "pin_type": "guest",
                        "old_status": old_status,
                        "new_status": "expired",
                    })),
            );
        }

        Ok(removed)
    }
}

enum EventOutcome {
    Created,
    Updated,
    Unchanged,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
