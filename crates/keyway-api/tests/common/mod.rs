//! Shared helpers for API integration tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use keyway_api::config::ServerConfig;
use keyway_api::router::build_app_router;
use keyway_api::state::AppState;
use keyway_api::ws::WsManager;
use keyway_engine::{FeedFetcher, StaticScheduleEvaluator, SyncScheduler, SyncService};
use keyway_events::EventBus;
use keyway_locks::{HaClient, HaConfig, LockWriter, ZwaveJsUiClient};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Build the full application router over a test database.
///
/// External collaborators point at unroutable addresses; tests exercise
/// the HTTP surface and the store, not the transports.
pub fn build_test_app(pool: SqlitePool) -> Router {
    let config = Arc::new(ServerConfig::new(
        "127.0.0.1:0".to_string(),
        "/tmp/keyway-test".to_string(),
        "/tmp/keyway-test-static".to_string(),
    ));

    let bus = Arc::new(EventBus::default());
    let ws_manager = Arc::new(WsManager::new());
    let ha = Arc::new(HaClient::new(HaConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        token: String::new(),
        supervisor_token: String::new(),
        timeout: std::time::Duration::from_millis(200),
    }));
    let zwave = Arc::new(ZwaveJsUiClient::new());

    let writer = LockWriter::new(
        pool.clone(),
        Arc::clone(&ha),
        zwave,
        Arc::clone(&bus),
        30,
    );

    let sync = Arc::new(SyncService::new(
        pool.clone(),
        FeedFetcher::new(),
        Arc::clone(&bus),
    ));
    let scheduler = SyncScheduler::new(pool.clone(), sync, 15, CancellationToken::new());

    let evaluator = StaticScheduleEvaluator::new(
        pool.clone(),
        keyway_api::background::intent_sink(&writer),
        Arc::clone(&bus),
    );

    build_app_router(AppState {
        pool,
        config,
        bus,
        ws_manager,
        writer,
        ha,
        scheduler,
        evaluator,
    })
}

pub async fn request(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    request(app, Method::GET, uri, None).await
}

pub async fn post(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    request(app, Method::POST, uri, Some(body)).await
}

pub async fn put(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    request(app, Method::PUT, uri, Some(body)).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn expect_status(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
