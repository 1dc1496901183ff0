//! Health check handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::AppState;

/// GET /api/health
///
/// Liveness plus a database connectivity probe.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = keyway_db::health_check(&state.pool).await.is_ok();

    Json(serde_json::json!({
        "status": if db_healthy { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "db_healthy": db_healthy,
    }))
}
