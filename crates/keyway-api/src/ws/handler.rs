use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use crate::state::AppState;

/// GET /ws
///
/// Upgrade the connection and register it with the manager. Outbound
/// traffic is engine events serialised by the forwarder; inbound traffic
/// is ignored apart from close frames and pongs.
pub async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let mut outbound = state.ws_manager.add(conn_id.clone()).await;
    tracing::debug!(conn_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            message = outbound.recv() => {
                match message {
                    Some(message) => {
                        if sink.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // pings are answered by axum; data is ignored
                    Some(Err(e)) => {
                        tracing::debug!(conn_id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    state.ws_manager.remove(&conn_id).await;
    tracing::debug!(conn_id, "WebSocket disconnected");
}
