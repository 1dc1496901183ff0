//! Integration tests for the `/api/guest-pins` surface.
//!
//! Guest PINs are created by the sync pipeline, so these tests seed rows
//! through the store and exercise the HTTP surface on top.

mod common;

use axum::http::StatusCode;
use axum::Router;
use chrono::{Duration, Utc};
use common::{expect_status, get, post, put};
use keyway_db::models::calendar::CreateCalendar;
use keyway_db::models::guest_pin::NewGuestPin;
use keyway_db::repositories::{CalendarRepo, GuestPinRepo};
use serde_json::json;
use sqlx::SqlitePool;

async fn seed_pin(pool: &SqlitePool, code: &str, from_hours: i64, until_hours: i64) -> String {
    let calendar = match CalendarRepo::list(pool).await.unwrap().into_iter().next() {
        Some(calendar) => calendar,
        None => CalendarRepo::create(
            pool,
            &CreateCalendar {
                name: "Rental".to_string(),
                url: "https://feed.example/r.ics".to_string(),
                sync_interval_min: 15,
                enabled: true,
                lock_ids: vec![],
            },
        )
        .await
        .unwrap(),
    };

    let now = Utc::now();
    GuestPinRepo::create(
        pool,
        &NewGuestPin {
            calendar_id: calendar.id,
            event_uid: keyway_db::new_id(),
            event_summary: Some("Reserved".to_string()),
            pin_code: code.to_string(),
            generation_method: "phone_last4".to_string(),
            custom_pin: None,
            valid_from: now + Duration::hours(from_hours),
            valid_until: now + Duration::hours(until_hours),
            status: "pending".to_string(),
            regeneration_eligible: true,
        },
    )
    .await
    .unwrap()
    .id
}

async fn fetch_pin(app: &Router, id: &str) -> serde_json::Value {
    expect_status(
        get(app.clone(), &format!("/api/guest-pins/{id}")).await,
        StatusCode::OK,
    )
    .await
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn list_and_get_round_trip(pool: SqlitePool) {
    let id = seed_pin(&pool, "0421", 48, 96).await;
    let app = common::build_test_app(pool);

    let listed = expect_status(get(app.clone(), "/api/guest-pins").await, StatusCode::OK).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let fetched = fetch_pin(&app, &id).await;
    assert_eq!(fetched["data"]["pin_code"], "0421");
    assert_eq!(fetched["data"]["locks"].as_array().unwrap().len(), 0);
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn custom_code_override_is_validated(pool: SqlitePool) {
    let id = seed_pin(&pool, "0421", 48, 96).await;
    let app = common::build_test_app(pool);

    // Too short.
    let response = put(
        app.clone(),
        &format!("/api/guest-pins/{id}"),
        json!({ "custom_pin": "12" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Valid override flips the method to custom.
    let updated = expect_status(
        put(
            app.clone(),
            &format!("/api/guest-pins/{id}"),
            json!({ "custom_pin": "2468" }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(updated["data"]["pin_code"], "2468");
    assert_eq!(updated["data"]["generation_method"], "custom");
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn custom_code_conflicting_with_overlapping_pin_is_refused(pool: SqlitePool) {
    let first = seed_pin(&pool, "1234", 24, 72).await;
    let second = seed_pin(&pool, "9999", 48, 96).await;
    let app = common::build_test_app(pool);
    let _ = first;

    let body = expect_status(
        put(
            app,
            &format!("/api/guest-pins/{second}"),
            json!({ "custom_pin": "1234" }),
        )
        .await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(body["code"], "CONFLICT");
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn status_transitions_are_monotonic(pool: SqlitePool) {
    let id = seed_pin(&pool, "0421", 48, 96).await;
    let app = common::build_test_app(pool);

    // pending -> active is fine.
    let updated = expect_status(
        put(
            app.clone(),
            &format!("/api/guest-pins/{id}"),
            json!({ "status": "active" }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(updated["data"]["status"], "active");

    // active -> pending is not.
    let response = put(
        app.clone(),
        &format!("/api/guest-pins/{id}"),
        json!({ "status": "pending" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // expired is terminal.
    put(
        app.clone(),
        &format!("/api/guest-pins/{id}"),
        json!({ "status": "expired" }),
    )
    .await;
    let response = put(
        app,
        &format!("/api/guest-pins/{id}"),
        json!({ "status": "active" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn regeneration_is_gated_on_lead_time(pool: SqlitePool) {
    // Check-in in 23 hours: not eligible.
    let soon = seed_pin(&pool, "0421", 23, 96).await;
    // Check-in in 25 hours: eligible.
    let later = seed_pin(&pool, "0422", 25, 96).await;
    let app = common::build_test_app(pool);

    let response = post(
        app.clone(),
        &format!("/api/guest-pins/{soon}/regenerate"),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let regenerated = expect_status(
        post(
            app.clone(),
            &format!("/api/guest-pins/{later}/regenerate"),
            json!({}),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    // Stored fields have no description, so the chain lands on date-based.
    assert_eq!(regenerated["data"]["generation_method"], "date_based");
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn conflicts_and_alternative_endpoints(pool: SqlitePool) {
    let first = seed_pin(&pool, "1234", 24, 72).await;
    let second = seed_pin(&pool, "1234", 48, 96).await;
    let app = common::build_test_app(pool);

    let conflicts = expect_status(
        get(app.clone(), &format!("/api/guest-pins/{second}/conflicts")).await,
        StatusCode::OK,
    )
    .await;
    let reports = conflicts["data"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["conflicting_pin_id"], first.as_str());
    assert!(reports[0].get("pin_code").is_none());

    let alternative = expect_status(
        get(app, &format!("/api/guest-pins/{second}/alternative")).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(alternative["data"]["alternative"], "1235");
}
