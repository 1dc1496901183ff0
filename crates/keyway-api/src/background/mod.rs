//! Background loop supervision.
//!
//! Spawns the periodic engine loops (status scheduler, assignment drain,
//! static evaluator, lock status refresh, WebSocket heartbeat, event
//! forwarder) under one cancellation token so shutdown stops them all.

use std::sync::Arc;
use std::time::Duration;

use keyway_engine::{static_eval, status, StaticScheduleEvaluator};
use keyway_locks::{discovery, HaClient, IntentSink, LockWriter};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;
use crate::ws;

/// Cadence of the lock status refresh.
const LOCK_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Spawn every background loop. Returns the join handles so shutdown can
/// wait for them within the grace budget.
pub fn spawn_all(
    state: &AppState,
    evaluator: Arc<StaticScheduleEvaluator>,
    cancel: &CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let sink: Arc<dyn IntentSink> = Arc::clone(&state.writer) as Arc<dyn IntentSink>;
    let mut handles = Vec::new();

    handles.push(tokio::spawn(status::run_status_loop(
        state.pool.clone(),
        Arc::clone(&sink),
        Arc::clone(&state.bus),
        cancel.child_token(),
    )));

    handles.push(tokio::spawn(status::run_drain_loop(
        state.pool.clone(),
        Arc::clone(&sink),
        cancel.child_token(),
    )));

    handles.push(tokio::spawn(static_eval::run_evaluator_loop(
        evaluator,
        cancel.child_token(),
    )));

    handles.push(tokio::spawn(run_lock_refresh_loop(
        state.pool.clone(),
        Arc::clone(&state.ha),
        Arc::clone(&state.bus),
        cancel.child_token(),
    )));

    handles.push(ws::start_heartbeat(
        Arc::clone(&state.ws_manager),
        cancel.child_token(),
    ));

    handles.push(tokio::spawn(ws::run_event_forwarder(
        Arc::clone(&state.bus),
        Arc::clone(&state.ws_manager),
        cancel.child_token(),
    )));

    handles
}

/// Periodically refresh lock status from Home Assistant.
async fn run_lock_refresh_loop(
    pool: keyway_db::DbPool,
    ha: Arc<HaClient>,
    bus: Arc<keyway_events::EventBus>,
    cancel: CancellationToken,
) {
    tracing::info!("Lock status refresh started");
    let mut interval = tokio::time::interval(LOCK_REFRESH_INTERVAL);
    interval.tick().await; // skip the immediate tick; startup already probes

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lock status refresh stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = discovery::refresh_lock_status(&pool, &ha, &bus).await {
                    tracing::warn!(error = %e, "Lock status refresh failed");
                }
            }
        }
    }
}

/// Narrow the writer to the intent-sink capability the schedulers use.
pub fn intent_sink(writer: &Arc<LockWriter>) -> Arc<dyn IntentSink> {
    Arc::clone(writer) as Arc<dyn IntentSink>
}
