use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::WsManager;

/// How often clients are pinged to keep intermediaries from dropping
/// idle connections.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn the heartbeat task. Runs until cancelled.
pub fn start_heartbeat(
    manager: Arc<WsManager>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => manager.ping_all().await,
            }
        }
    })
}
