//! The status scheduler.
//!
//! Two reconciliations drive the pending -> active -> expired lifecycle
//! against wall-clock time: a one-minute activate/expire tick and a
//! thirty-second drain of pending assignments. The drain recovers from a
//! crash between persisting a status change and enqueuing its intent, and
//! deliberately skips `failed` rows so a persistently broken lock is not
//! woken every sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use keyway_core::pin::PinStatus;
use keyway_core::schedule;
use keyway_db::error::StoreResult;
use keyway_db::repositories::{GuestPinRepo, StaticPinRepo};
use keyway_db::DbPool;
use keyway_events::{types as event_types, EngineEvent, EventBus};
use keyway_locks::{IntentSink, Owner};
use tokio_util::sync::CancellationToken;

/// Cadence of the activate/expire reconciliation.
pub const STATUS_TICK: Duration = Duration::from_secs(60);

/// Cadence of the pending-assignment drain.
pub const DRAIN_TICK: Duration = Duration::from_secs(30);

/// Run the one-minute activate/expire loop until cancelled.
pub async fn run_status_loop(
    pool: DbPool,
    sink: Arc<dyn IntentSink>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
) {
    tracing::info!("PIN status scheduler started");
    let mut interval = tokio::time::interval(STATUS_TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("PIN status scheduler stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = activate_expire_tick(&pool, sink.as_ref(), &bus).await {
                    tracing::error!(error = %e, "Status tick failed");
                }
            }
        }
    }
}

/// Run the thirty-second drain loop until cancelled.
pub async fn run_drain_loop(pool: DbPool, sink: Arc<dyn IntentSink>, cancel: CancellationToken) {
    tracing::info!("Assignment drain started");
    let mut interval = tokio::time::interval(DRAIN_TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Assignment drain stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = drain_pending_tick(&pool, sink.as_ref()).await {
                    tracing::error!(error = %e, "Drain tick failed");
                }
            }
        }
    }
}

/// Activate pending PINs whose window has opened and expire active PINs
/// whose window has closed, enqueuing the matching intents.
pub async fn activate_expire_tick(
    pool: &DbPool,
    sink: &dyn IntentSink,
    bus: &EventBus,
) -> StoreResult<()> {
    let now = Utc::now();

    for pin in GuestPinRepo::list_pending_activation(pool, now).await? {
        GuestPinRepo::update_status(pool, &pin.id, PinStatus::Active.as_str()).await?;
        GuestPinRepo::mark_assignments_pending(pool, &pin.id).await?;

        for assignment in GuestPinRepo::assignments(pool, &pin.id).await? {
            if assignment.slot_number >= 1 {
                sink.queue_set(
                    &assignment.lock_id,
                    &pin.pin_code,
                    assignment.slot_number,
                    Owner::Guest(pin.id.clone()),
                );
            }
        }

        tracing::info!(pin_id = %pin.id, "Activated guest PIN");
        publish_status_change(bus, &pin.id, &pin.status, PinStatus::Active);
    }

    for pin in GuestPinRepo::list_active_expired(pool, now).await? {
        GuestPinRepo::update_status(pool, &pin.id, PinStatus::Expired.as_str()).await?;
        GuestPinRepo::mark_assignments_pending(pool, &pin.id).await?;

        for assignment in GuestPinRepo::assignments(pool, &pin.id).await? {
            if assignment.slot_number >= 1 {
                sink.queue_clear(
                    &assignment.lock_id,
                    assignment.slot_number,
                    Owner::Guest(pin.id.clone()),
                );
            }
        }

        tracing::info!(pin_id = %pin.id, "Expired guest PIN");
        publish_status_change(bus, &pin.id, &pin.status, PinStatus::Expired);
    }

    Ok(())
}

/// Re-emit intents for assignments stuck in `pending`, deriving the
/// desired state from the parent PIN.
pub async fn drain_pending_tick(pool: &DbPool, sink: &dyn IntentSink) -> StoreResult<()> {
    for row in GuestPinRepo::list_pending_sync(pool).await? {
        if row.status == PinStatus::Active.as_str() {
            sink.queue_set(
                &row.lock_id,
                &row.pin_code,
                row.slot_number,
                Owner::Guest(row.guest_pin_id.clone()),
            );
        } else if row.status == PinStatus::Expired.as_str() {
            sink.queue_clear(
                &row.lock_id,
                row.slot_number,
                Owner::Guest(row.guest_pin_id.clone()),
            );
        }
        // Pending or conflicted parents produce no intent yet.
    }

    // For static assignments the desired state is the schedule verdict at
    // this instant, in local time.
    let (weekday, hhmm) = schedule::day_and_time(&Local::now());
    let mut windows_by_pin = HashMap::new();

    for row in StaticPinRepo::list_pending_sync(pool).await? {
        if !windows_by_pin.contains_key(&row.static_pin_id) {
            let schedules = StaticPinRepo::schedules(pool, &row.static_pin_id).await?;
            let windows: Vec<_> = schedules.iter().map(|s| s.window()).collect();
            windows_by_pin.insert(row.static_pin_id.clone(), windows);
        }
        let windows = &windows_by_pin[&row.static_pin_id];

        let pin = StaticPinRepo::find_by_id(pool, &row.static_pin_id).await?;
        let always_active = pin.map(|p| p.always_active).unwrap_or(false);

        if schedule::should_be_resident(row.enabled, always_active, windows, weekday, &hhmm) {
            sink.queue_set(
                &row.lock_id,
                &row.pin_code,
                row.slot_number,
                Owner::Static(row.static_pin_id.clone()),
            );
        } else {
            sink.queue_clear(
                &row.lock_id,
                row.slot_number,
                Owner::Static(row.static_pin_id.clone()),
            );
        }
    }

    Ok(())
}

fn publish_status_change(bus: &EventBus, pin_id: &str, old_status: &str, new_status: PinStatus) {
    bus.publish(
        EngineEvent::new(event_types::PIN_STATUS_CHANGED)
            .with_source("guest_pin", pin_id)
            .with_payload(serde_json::json!({
                "pin_id": pin_id,
                "pin_type": "guest",
                "old_status": old_status,
                "new_status": new_status.as_str(),
            })),
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
