//! Integration tests for the `/api/static-pins` surface.

mod common;

use axum::http::{Method, StatusCode};
use common::{expect_status, get, post, put, request};
use serde_json::json;
use sqlx::SqlitePool;

fn pin_payload(name: &str, slot: i64) -> serde_json::Value {
    json!({
        "name": name,
        "pin_code": "7777",
        "slot_number": slot,
        "schedules": [
            { "day_of_week": 5, "start_time": "22:00", "end_time": "06:00" }
        ],
    })
}

async fn create_lock(app: &axum::Router) -> String {
    let lock = expect_status(
        post(
            app.clone(),
            "/api/locks",
            json!({
                "entity_id": "lock.back_door",
                "name": "Back Door",
                "protocol": "zwave",
                "total_slots": 10,
                "guest_slots": 5,
                "static_slots": 5,
            }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    lock["data"]["id"].as_str().unwrap().to_string()
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn static_pin_crud_round_trip(pool: SqlitePool) {
    let app = common::build_test_app(pool);

    let created = expect_status(
        post(app.clone(), "/api/static-pins", pin_payload("Cleaner", 6)).await,
        StatusCode::CREATED,
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["name"], "Cleaner");
    assert_eq!(created["data"]["enabled"], true);

    // get_static_pin returns schedules alongside server-assigned fields.
    let fetched = expect_status(
        get(app.clone(), &format!("/api/static-pins/{id}")).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(fetched["data"]["pin_code"], "7777");
    assert_eq!(fetched["data"]["schedules"].as_array().unwrap().len(), 1);
    assert_eq!(fetched["data"]["schedules"][0]["start_time"], "22:00");

    let updated = expect_status(
        put(
            app.clone(),
            &format!("/api/static-pins/{id}"),
            json!({ "enabled": false }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(updated["data"]["enabled"], false);

    let deleted = request(
        app.clone(),
        Method::DELETE,
        &format!("/api/static-pins/{id}"),
        None,
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = get(app, &format!("/api/static-pins/{id}")).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn malformed_schedule_shape_is_rejected(pool: SqlitePool) {
    let app = common::build_test_app(pool);

    let mut payload = pin_payload("Cleaner", 1);
    payload["schedules"][0]["day_of_week"] = json!(7);
    let response = post(app.clone(), "/api/static-pins", payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut payload = pin_payload("Cleaner", 1);
    payload["schedules"][0]["start_time"] = json!("9:00");
    let response = post(app, "/api/static-pins", payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn non_digit_code_is_rejected(pool: SqlitePool) {
    let app = common::build_test_app(pool);
    let mut payload = pin_payload("Cleaner", 1);
    payload["pin_code"] = json!("12ab");

    let response = post(app, "/api/static-pins", payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn duplicate_name_is_a_conflict_case_insensitively(pool: SqlitePool) {
    let app = common::build_test_app(pool);

    let first = post(app.clone(), "/api/static-pins", pin_payload("Cleaner", 1)).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let body = expect_status(
        post(app, "/api/static-pins", pin_payload("CLEANER", 2)).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(body["code"], "CONFLICT");
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn duplicate_codes_across_distinct_names_are_allowed(pool: SqlitePool) {
    let app = common::build_test_app(pool);

    let first = post(app.clone(), "/api/static-pins", pin_payload("Cleaner", 1)).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = post(app, "/api/static-pins", pin_payload("Gardener", 2)).await;
    assert_eq!(second.status(), StatusCode::CREATED);
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn occupied_slot_assignment_conflicts(pool: SqlitePool) {
    let app = common::build_test_app(pool);
    let lock_id = create_lock(&app).await;

    let mut payload = pin_payload("Cleaner", 3);
    payload["lock_ids"] = json!([lock_id.clone()]);
    let created = post(app.clone(), "/api/static-pins", payload).await;
    assert_eq!(created.status(), StatusCode::CREATED);

    // A second PIN on the same slot of the same lock is refused.
    let mut payload = pin_payload("Gardener", 3);
    payload["lock_ids"] = json!([lock_id]);
    let body = expect_status(
        post(app, "/api/static-pins", payload).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(body["code"], "CONFLICT");
}
