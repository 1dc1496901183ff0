//! Direct PIN operations over the Z-Wave JS UI WebSocket API.
//!
//! Bypasses Home Assistant for battery-efficient writes when a lock
//! declares the `zwave_js_ui` direct integration and its node id is known.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::zwave_js_ui_url;
use crate::transport::TransportError;

/// Z-Wave USER_CODE command class.
const COMMAND_CLASS_USER_CODE: u8 = 99;

/// Per-call timeout for direct writes.
const DIRECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct NodeCommand {
    command: &'static str,
    #[serde(rename = "nodeId")]
    node_id: i64,
    endpoint: u8,
    #[serde(rename = "commandClass")]
    command_class: u8,
    #[serde(rename = "methodName")]
    method_name: &'static str,
    args: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: String,
}

/// WebSocket client for a Z-Wave JS UI controller.
pub struct ZwaveJsUiClient {
    api_key: String,
    timeout: Duration,
}

impl ZwaveJsUiClient {
    /// Build a client from environment defaults.
    ///
    /// `ZWAVE_JS_UI_API_KEY` optionally sets a bearer token; the WebSocket
    /// URL comes from the runtime cell in [`crate::config`].
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("ZWAVE_JS_UI_API_KEY").unwrap_or_default(),
            timeout: DIRECT_TIMEOUT,
        }
    }

    /// Write a user code directly.
    pub async fn set_user_code(
        &self,
        node_id: i64,
        slot: i64,
        code: &str,
    ) -> Result<(), TransportError> {
        self.call(NodeCommand {
            command: "node.execute_command",
            node_id,
            endpoint: 0,
            command_class: COMMAND_CLASS_USER_CODE,
            method_name: "setUserCode",
            args: vec![slot.into(), code.into()],
        })
        .await
    }

    /// Remove a user code directly.
    pub async fn clear_user_code(&self, node_id: i64, slot: i64) -> Result<(), TransportError> {
        self.call(NodeCommand {
            command: "node.execute_command",
            node_id,
            endpoint: 0,
            command_class: COMMAND_CLASS_USER_CODE,
            method_name: "clearUserCode",
            args: vec![slot.into()],
        })
        .await
    }

    /// Connect, send one command, and wait for the first response frame.
    ///
    /// Each call uses a fresh connection: writes are rare (batched) and a
    /// persistent socket would keep the controller awake.
    async fn call(&self, command: NodeCommand) -> Result<(), TransportError> {
        tokio::time::timeout(self.timeout, self.call_inner(command))
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    async fn call_inner(&self, command: NodeCommand) -> Result<(), TransportError> {
        let url = zwave_js_ui_url();

        let mut request = url.clone();
        if !self.api_key.is_empty() {
            // tokio-tungstenite takes headers via the request builder; the
            // UI accepts the token as a query parameter as well, which keeps
            // the handshake simple here.
            let sep = if request.contains('?') { '&' } else { '?' };
            request = format!("{request}{sep}token={}", self.api_key);
        }

        let (mut socket, _) = connect_async(request.as_str())
            .await
            .map_err(|e| TransportError::WebSocket(format!("connect to {url}: {e}")))?;

        let payload = serde_json::to_string(&command)
            .map_err(|e| TransportError::WebSocket(format!("encode command: {e}")))?;
        socket
            .send(Message::text(payload))
            .await
            .map_err(|e| TransportError::WebSocket(format!("send to {url}: {e}")))?;

        let frame = loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::WebSocket(format!("read from {url}: {e}")))
                }
                None => {
                    return Err(TransportError::WebSocket(format!(
                        "connection to {url} closed before a response"
                    )))
                }
            }
        };

        let response: CommandResponse = serde_json::from_str(&frame).unwrap_or_default();
        if !response.success {
            return Err(TransportError::Rejected(format!(
                "zwave_js_ui error: {}",
                response.error
            )));
        }

        let _ = socket.close(None).await;
        Ok(())
    }
}

impl Default for ZwaveJsUiClient {
    fn default() -> Self {
        Self::new()
    }
}
