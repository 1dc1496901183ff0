//! Shared fixtures for store tests.

use chrono::{Duration, Utc};
use keyway_db::models::calendar::CreateCalendar;
use keyway_db::models::guest_pin::NewGuestPin;
use keyway_db::models::lock::CreateLock;
use keyway_db::repositories::{CalendarRepo, GuestPinRepo, LockRepo};
use sqlx::SqlitePool;

pub async fn make_lock(pool: &SqlitePool, entity_id: &str, total: i64, guest: i64) -> String {
    let lock = LockRepo::create(
        pool,
        &CreateLock {
            entity_id: entity_id.to_string(),
            name: format!("Lock {entity_id}"),
            protocol: "zwave".to_string(),
            total_slots: total,
            guest_slots: guest,
            static_slots: total - guest,
            direct_integration: None,
        },
    )
    .await
    .expect("create lock");
    lock.id
}

pub async fn make_calendar(pool: &SqlitePool, url: &str, lock_ids: Vec<String>) -> String {
    let calendar = CalendarRepo::create(
        pool,
        &CreateCalendar {
            name: format!("Calendar {url}"),
            url: url.to_string(),
            sync_interval_min: 15,
            enabled: true,
            lock_ids,
        },
    )
    .await
    .expect("create calendar");
    calendar.id
}

pub fn pin_draft(calendar_id: &str, event_uid: &str, code: &str, status: &str) -> NewGuestPin {
    let now = Utc::now();
    NewGuestPin {
        calendar_id: calendar_id.to_string(),
        event_uid: event_uid.to_string(),
        event_summary: Some("Reserved".to_string()),
        pin_code: code.to_string(),
        generation_method: "date_based".to_string(),
        custom_pin: None,
        valid_from: now + Duration::days(2),
        valid_until: now + Duration::days(4),
        status: status.to_string(),
        regeneration_eligible: true,
    }
}

pub async fn make_pin(pool: &SqlitePool, calendar_id: &str, event_uid: &str, code: &str) -> String {
    GuestPinRepo::create(pool, &pin_draft(calendar_id, event_uid, code, "pending"))
        .await
        .expect("create guest pin")
        .id
}
