use std::sync::Arc;

use keyway_engine::{FeedFetcher, StaticScheduleEvaluator, SyncScheduler};
use keyway_events::EventBus;
use keyway_locks::{HaClient, LockWriter};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable: inner data is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: keyway_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Engine event bus.
    pub bus: Arc<EventBus>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Batching lock writer.
    pub writer: Arc<LockWriter>,
    /// Home Assistant client, used by discovery and status refresh.
    pub ha: Arc<HaClient>,
    /// Calendar sync scheduler.
    pub scheduler: Arc<SyncScheduler<FeedFetcher>>,
    /// Static schedule evaluator.
    pub evaluator: Arc<StaticScheduleEvaluator>,
}
