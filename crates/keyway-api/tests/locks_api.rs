//! Integration tests for the `/api/locks` surface.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, expect_status, get, post, put, request};
use serde_json::json;
use sqlx::SqlitePool;

fn lock_payload() -> serde_json::Value {
    json!({
        "entity_id": "lock.front_door",
        "name": "Front Door",
        "protocol": "zwave",
        "total_slots": 10,
        "guest_slots": 6,
        "static_slots": 4,
    })
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn lock_crud_round_trip(pool: SqlitePool) {
    let app = common::build_test_app(pool);

    let created = expect_status(
        post(app.clone(), "/api/locks", lock_payload()).await,
        StatusCode::CREATED,
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["entity_id"], "lock.front_door");
    assert_eq!(created["data"]["online"], false);
    assert_eq!(created["data"]["lock_state"], "unknown");

    let listed = body_json(get(app.clone(), "/api/locks").await).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let updated = expect_status(
        put(
            app.clone(),
            &format!("/api/locks/{id}"),
            json!({ "name": "Main Entrance", "guest_slots": 5 }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(updated["data"]["name"], "Main Entrance");
    assert_eq!(updated["data"]["guest_slots"], 5);

    let deleted = request(app.clone(), Method::DELETE, &format!("/api/locks/{id}"), None).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = get(app, &format!("/api/locks/{id}")).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn invalid_protocol_is_rejected(pool: SqlitePool) {
    let app = common::build_test_app(pool);
    let mut payload = lock_payload();
    payload["protocol"] = json!("bluetooth");

    let body = expect_status(
        post(app, "/api/locks", payload).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn over_committed_slot_budget_is_rejected(pool: SqlitePool) {
    let app = common::build_test_app(pool);
    let mut payload = lock_payload();
    payload["guest_slots"] = json!(8);
    payload["static_slots"] = json!(8);

    let response = post(app, "/api/locks", payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../keyway-db/migrations")]
async fn duplicate_entity_id_conflicts(pool: SqlitePool) {
    let app = common::build_test_app(pool);

    let first = post(app.clone(), "/api/locks", lock_payload()).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let body = expect_status(
        post(app, "/api/locks", lock_payload()).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(body["code"], "CONFLICT");
}
