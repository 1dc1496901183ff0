use std::sync::Arc;

use axum::extract::ws::Message;
use keyway_events::EventBus;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::WsManager;

/// Forward every engine event to all connected WebSocket clients as JSON.
///
/// Runs until cancelled. A lagged receiver drops the missed events and
/// keeps going; clients re-read current state over HTTP anyway.
pub async fn run_event_forwarder(
    bus: Arc<EventBus>,
    manager: Arc<WsManager>,
    cancel: CancellationToken,
) {
    let mut rx = bus.subscribe();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => {
                match received {
                    Ok(event) => {
                        match serde_json::to_string(&event) {
                            Ok(text) => manager.broadcast(Message::Text(text.into())).await,
                            Err(e) => tracing::error!(error = %e, "Failed to encode event"),
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Event forwarder lagged; dropping missed events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}
