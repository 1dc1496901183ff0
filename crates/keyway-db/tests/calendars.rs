//! Store tests for calendar subscriptions.

mod common;

use common::{make_calendar, make_lock};
use keyway_db::models::calendar::{CreateCalendar, UpdateCalendar};
use keyway_db::repositories::CalendarRepo;
use keyway_db::StoreError;
use sqlx::SqlitePool;

#[sqlx::test]
async fn url_must_be_unique(pool: SqlitePool) {
    make_calendar(&pool, "https://feed.example/a.ics", vec![]).await;

    let err = CalendarRepo::create(
        &pool,
        &CreateCalendar {
            name: "Duplicate".to_string(),
            url: "https://feed.example/a.ics".to_string(),
            sync_interval_min: 30,
            enabled: true,
            lock_ids: vec![],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[sqlx::test]
async fn list_enabled_puts_never_synced_first(pool: SqlitePool) {
    let first = make_calendar(&pool, "https://feed.example/a.ics", vec![]).await;
    let second = make_calendar(&pool, "https://feed.example/b.ics", vec![]).await;

    // `first` has synced; `second` never has, so it sorts to the front.
    CalendarRepo::update_sync_status(&pool, &first, "success", None)
        .await
        .unwrap();

    let enabled = CalendarRepo::list_enabled(&pool).await.unwrap();
    assert_eq!(enabled.len(), 2);
    assert_eq!(enabled[0].id, second);
    assert_eq!(enabled[1].id, first);
}

#[sqlx::test]
async fn disabled_calendars_are_excluded(pool: SqlitePool) {
    let id = make_calendar(&pool, "https://feed.example/a.ics", vec![]).await;
    CalendarRepo::update(
        &pool,
        &id,
        &UpdateCalendar {
            enabled: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(CalendarRepo::list_enabled(&pool).await.unwrap().is_empty());
}

#[sqlx::test]
async fn sync_status_touches_last_sync_only_on_success(pool: SqlitePool) {
    let id = make_calendar(&pool, "https://feed.example/a.ics", vec![]).await;

    CalendarRepo::update_sync_status(&pool, &id, "error", Some("fetch failed"))
        .await
        .unwrap();
    let cal = CalendarRepo::find_by_id(&pool, &id).await.unwrap().unwrap();
    assert_eq!(cal.sync_status, "error");
    assert_eq!(cal.sync_error.as_deref(), Some("fetch failed"));
    assert!(cal.last_sync_at.is_none());

    CalendarRepo::update_sync_status(&pool, &id, "success", None)
        .await
        .unwrap();
    let cal = CalendarRepo::find_by_id(&pool, &id).await.unwrap().unwrap();
    assert_eq!(cal.sync_status, "success");
    assert!(cal.sync_error.is_none());
    assert!(cal.last_sync_at.is_some());
}

#[sqlx::test]
async fn set_lock_ids_replaces_mappings(pool: SqlitePool) {
    let lock_a = make_lock(&pool, "lock.a", 10, 5).await;
    let lock_b = make_lock(&pool, "lock.b", 10, 5).await;
    let cal = make_calendar(&pool, "https://feed.example/a.ics", vec![lock_a.clone()]).await;

    assert_eq!(CalendarRepo::lock_ids(&pool, &cal).await.unwrap(), vec![lock_a]);

    CalendarRepo::set_lock_ids(&pool, &cal, &[lock_b.clone()])
        .await
        .unwrap();
    assert_eq!(CalendarRepo::lock_ids(&pool, &cal).await.unwrap(), vec![lock_b]);
}
