//! Store tests for guest PINs, conflicts, and slot allocation.

mod common;

use chrono::{Duration, Utc};
use common::{make_calendar, make_lock, make_pin, pin_draft};
use keyway_db::models::guest_pin::NewGuestPin;
use keyway_db::repositories::guest_pin_repo::AssignOutcome;
use keyway_db::repositories::{CalendarRepo, GuestPinRepo};
use keyway_db::StoreError;
use sqlx::SqlitePool;

#[sqlx::test]
async fn event_uid_is_unique_per_calendar(pool: SqlitePool) {
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![]).await;
    make_pin(&pool, &cal, "evt-1", "1234").await;

    let err = GuestPinRepo::create(&pool, &pin_draft(&cal, "evt-1", "5678", "pending"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    // The same uid on a different calendar is fine.
    let other = make_calendar(&pool, "https://feed.example/b.ics", vec![]).await;
    make_pin(&pool, &other, "evt-1", "5678").await;
}

#[sqlx::test]
async fn find_by_event_round_trips(pool: SqlitePool) {
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![]).await;
    let id = make_pin(&pool, &cal, "evt-1", "1234").await;

    let found = GuestPinRepo::find_by_event(&pool, &cal, "evt-1")
        .await
        .unwrap()
        .expect("pin should exist");
    assert_eq!(found.id, id);
    assert_eq!(found.pin_code, "1234");
    assert!(GuestPinRepo::find_by_event(&pool, &cal, "evt-2")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test]
async fn pending_activation_and_expiry_queries(pool: SqlitePool) {
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![]).await;
    let now = Utc::now();

    let due = NewGuestPin {
        valid_from: now - Duration::hours(1),
        valid_until: now + Duration::days(1),
        ..pin_draft(&cal, "due", "1111", "pending")
    };
    let future = NewGuestPin {
        ..pin_draft(&cal, "future", "2222", "pending")
    };
    let stale = NewGuestPin {
        valid_from: now - Duration::days(3),
        valid_until: now - Duration::minutes(1),
        ..pin_draft(&cal, "stale", "3333", "active")
    };
    GuestPinRepo::create(&pool, &due).await.unwrap();
    GuestPinRepo::create(&pool, &future).await.unwrap();
    GuestPinRepo::create(&pool, &stale).await.unwrap();

    let pending = GuestPinRepo::list_pending_activation(&pool, now).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_uid, "due");

    let expired = GuestPinRepo::list_active_expired(&pool, now).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].event_uid, "stale");
}

#[sqlx::test]
async fn conflict_query_matches_overlapping_codes_only(pool: SqlitePool) {
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![]).await;
    let now = Utc::now();

    let existing = NewGuestPin {
        valid_from: now + Duration::days(1),
        valid_until: now + Duration::days(3),
        ..pin_draft(&cal, "a", "1234", "pending")
    };
    GuestPinRepo::create(&pool, &existing).await.unwrap();

    // Overlapping window, same code: conflict.
    let hits = GuestPinRepo::find_conflicts(
        &pool,
        "1234",
        now + Duration::days(2),
        now + Duration::days(4),
        "",
    )
    .await
    .unwrap();
    assert_eq!(hits.len(), 1);

    // Disjoint window: no conflict.
    let hits = GuestPinRepo::find_conflicts(
        &pool,
        "1234",
        now + Duration::days(3),
        now + Duration::days(5),
        "",
    )
    .await
    .unwrap();
    assert!(hits.is_empty());

    // Different code: no conflict.
    let hits = GuestPinRepo::find_conflicts(
        &pool,
        "9999",
        now + Duration::days(1),
        now + Duration::days(3),
        "",
    )
    .await
    .unwrap();
    assert!(hits.is_empty());
}

#[sqlx::test]
async fn conflict_query_skips_expired_and_conflicted(pool: SqlitePool) {
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![]).await;
    let now = Utc::now();

    for (uid, status) in [("x", "expired"), ("y", "conflict")] {
        let draft = NewGuestPin {
            valid_from: now + Duration::days(1),
            valid_until: now + Duration::days(3),
            ..pin_draft(&cal, uid, "1234", status)
        };
        GuestPinRepo::create(&pool, &draft).await.unwrap();
    }

    let hits = GuestPinRepo::find_conflicts(
        &pool,
        "1234",
        now + Duration::days(1),
        now + Duration::days(3),
        "",
    )
    .await
    .unwrap();
    assert!(hits.is_empty());
}

#[sqlx::test]
async fn slot_allocation_picks_lowest_free_slot(pool: SqlitePool) {
    let lock = make_lock(&pool, "lock.front_door", 10, 5).await;
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![lock.clone()]).await;

    let first = make_pin(&pool, &cal, "evt-1", "1111").await;
    let second = make_pin(&pool, &cal, "evt-2", "2222").await;

    let outcome = GuestPinRepo::assign_to_lock(&pool, &first, &lock).await.unwrap();
    assert_eq!(outcome, AssignOutcome::Assigned(1));

    let outcome = GuestPinRepo::assign_to_lock(&pool, &second, &lock).await.unwrap();
    assert_eq!(outcome, AssignOutcome::Assigned(2));

    // Expiring the first PIN frees its slot for the next allocation.
    GuestPinRepo::update_status(&pool, &first, "expired").await.unwrap();
    let third = make_pin(&pool, &cal, "evt-3", "3333").await;
    let outcome = GuestPinRepo::assign_to_lock(&pool, &third, &lock).await.unwrap();
    assert_eq!(outcome, AssignOutcome::Assigned(1));
}

#[sqlx::test]
async fn exhausted_guest_budget_records_a_failed_assignment(pool: SqlitePool) {
    let lock = make_lock(&pool, "lock.front_door", 4, 1).await;
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![lock.clone()]).await;

    let first = make_pin(&pool, &cal, "evt-1", "1111").await;
    let second = make_pin(&pool, &cal, "evt-2", "2222").await;

    assert_eq!(
        GuestPinRepo::assign_to_lock(&pool, &first, &lock).await.unwrap(),
        AssignOutcome::Assigned(1)
    );
    let outcome = GuestPinRepo::assign_to_lock(&pool, &second, &lock).await.unwrap();
    assert!(matches!(outcome, AssignOutcome::Failed(_)));

    let assignments = GuestPinRepo::assignments(&pool, &second).await.unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].sync_status, "failed");
    assert!(assignments[0].error_message.is_some());

    // Failed rows never enter the drain sweep.
    let pending = GuestPinRepo::list_pending_sync(&pool).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].guest_pin_id, first);
}

#[sqlx::test]
async fn assignment_sync_outcomes_are_recorded(pool: SqlitePool) {
    let lock = make_lock(&pool, "lock.front_door", 10, 5).await;
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![lock.clone()]).await;
    let pin = make_pin(&pool, &cal, "evt-1", "1111").await;

    GuestPinRepo::assign_to_lock(&pool, &pin, &lock).await.unwrap();
    GuestPinRepo::update_assignment_sync(&pool, &pin, &lock, "synced", None)
        .await
        .unwrap();

    let assignments = GuestPinRepo::assignments(&pool, &pin).await.unwrap();
    assert_eq!(assignments[0].sync_status, "synced");
    assert!(assignments[0].last_synced_at.is_some());

    GuestPinRepo::update_assignment_sync(&pool, &pin, &lock, "failed", Some("write failed"))
        .await
        .unwrap();
    let assignments = GuestPinRepo::assignments(&pool, &pin).await.unwrap();
    assert_eq!(assignments[0].sync_status, "failed");
    assert_eq!(assignments[0].error_message.as_deref(), Some("write failed"));
}

#[sqlx::test]
async fn deleting_a_calendar_cascades_to_pins_and_assignments(pool: SqlitePool) {
    let lock = make_lock(&pool, "lock.front_door", 10, 5).await;
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![lock.clone()]).await;
    let pin = make_pin(&pool, &cal, "evt-1", "1111").await;
    GuestPinRepo::assign_to_lock(&pool, &pin, &lock).await.unwrap();

    CalendarRepo::delete(&pool, &cal).await.unwrap();

    assert!(GuestPinRepo::find_by_id(&pool, &pin).await.unwrap().is_none());
    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guest_pin_locks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orphans, 0);
}
