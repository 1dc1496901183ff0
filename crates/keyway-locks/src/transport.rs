//! The per-lock writer chain.
//!
//! Transports are a capability set (`set_user_code`, `clear_user_code`)
//! selected data-driven from the lock's declared direct integration:
//! a chain of primary plus optional fallback, not a hierarchy.

use std::sync::Arc;

use crate::home_assistant::HaClient;
use crate::zwave_js_ui::ZwaveJsUiClient;

/// Errors from a lock transport. Messages never contain PIN codes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("transport call timed out")]
    Timeout,

    #[error("{0}")]
    Rejected(String),
}

/// One transport bound to one lock.
pub enum PinWriter {
    HomeAssistant {
        client: Arc<HaClient>,
        entity_id: String,
    },
    ZwaveJsUi {
        client: Arc<ZwaveJsUiClient>,
        node_id: i64,
    },
    #[cfg(test)]
    Recording(Arc<crate::writer::tests::RecordingTransport>, String),
}

impl PinWriter {
    pub fn name(&self) -> &'static str {
        match self {
            PinWriter::HomeAssistant { .. } => "home_assistant",
            PinWriter::ZwaveJsUi { .. } => "zwave_js_ui",
            #[cfg(test)]
            PinWriter::Recording(..) => "recording",
        }
    }

    pub async fn set(&self, slot: i64, code: &str) -> Result<(), TransportError> {
        match self {
            PinWriter::HomeAssistant { client, entity_id } => {
                client.set_user_code(entity_id, slot, code).await
            }
            PinWriter::ZwaveJsUi { client, node_id } => {
                client.set_user_code(*node_id, slot, code).await
            }
            #[cfg(test)]
            PinWriter::Recording(recorder, name) => recorder.set(name, slot, code),
        }
    }

    pub async fn clear(&self, slot: i64) -> Result<(), TransportError> {
        match self {
            PinWriter::HomeAssistant { client, entity_id } => {
                client.clear_user_code(entity_id, slot).await
            }
            PinWriter::ZwaveJsUi { client, node_id } => {
                client.clear_user_code(*node_id, slot).await
            }
            #[cfg(test)]
            PinWriter::Recording(recorder, name) => recorder.clear(name, slot),
        }
    }
}

/// Primary transport plus optional fallback for one lock.
pub struct WriterChain {
    pub primary: PinWriter,
    pub fallback: Option<PinWriter>,
}

impl WriterChain {
    pub fn single(primary: PinWriter) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(primary: PinWriter, fallback: PinWriter) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
        }
    }

    /// Set through the primary, falling back once on error.
    pub async fn set(&self, slot: i64, code: &str) -> Result<(), TransportError> {
        match self.primary.set(slot, code).await {
            Ok(()) => Ok(()),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        transport = self.primary.name(),
                        slot,
                        error = %err,
                        "Primary set failed; falling back"
                    );
                    fallback.set(slot, code).await
                }
                None => Err(err),
            },
        }
    }

    /// Clear through the primary, falling back once on error.
    pub async fn clear(&self, slot: i64) -> Result<(), TransportError> {
        match self.primary.clear(slot).await {
            Ok(()) => Ok(()),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        transport = self.primary.name(),
                        slot,
                        error = %err,
                        "Primary clear failed; falling back"
                    );
                    fallback.clear(slot).await
                }
                None => Err(err),
            },
        }
    }
}
