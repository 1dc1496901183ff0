//! The batching lock writer.
//!
//! SET/CLEAR intents are queued per lock and drained together when the
//! batch window closes, so a burst of schedule edges costs each lock one
//! wake-up instead of several. The first queued operation arms a single
//! global timer; a new timer is armed only when new work arrives after a
//! drain. `flush_now` cancels the timer and drains immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use keyway_core::types::DbId;
use keyway_db::models::sync_status;
use keyway_db::repositories::{GuestPinRepo, LockRepo, StaticPinRepo};
use keyway_db::DbPool;
use keyway_events::{types as event_types, EngineEvent, EventBus};
use tokio_util::sync::CancellationToken;

use crate::home_assistant::{HaClient, LockEntity};
use crate::transport::{PinWriter, WriterChain};
use crate::zwave_js_ui::ZwaveJsUiClient;

/// Which assignment row an operation reports its outcome to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Guest(DbId),
    Static(DbId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Set,
    Clear,
}

/// A pending operation against one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinOperation {
    pub slot: i64,
    pub kind: OpKind,
    /// Present for SET operations only.
    pub code: Option<String>,
    pub owner: Owner,
}

/// Where schedulers enqueue write intents.
///
/// The schedulers depend on this capability rather than on the writer
/// type, which keeps construction acyclic and the loops testable.
pub trait IntentSink: Send + Sync {
    fn queue_set(&self, lock_id: &str, code: &str, slot: i64, owner: Owner);
    fn queue_clear(&self, lock_id: &str, slot: i64, owner: Owner);
}

impl IntentSink for LockWriter {
    fn queue_set(&self, lock_id: &str, code: &str, slot: i64, owner: Owner) {
        LockWriter::queue_set(self, lock_id, code, slot, owner);
    }

    fn queue_clear(&self, lock_id: &str, slot: i64, owner: Owner) {
        LockWriter::queue_clear(self, lock_id, slot, owner);
    }
}

struct BatchState {
    queues: HashMap<DbId, Vec<PinOperation>>,
    timer_cancel: Option<CancellationToken>,
}

enum ChainSource {
    Live {
        ha: Arc<HaClient>,
        zwave: Arc<ZwaveJsUiClient>,
    },
    #[cfg(test)]
    Recording {
        recorder: Arc<tests::RecordingTransport>,
        with_fallback: bool,
    },
}

/// Coalesces write intents and executes them over the per-lock chain.
pub struct LockWriter {
    pool: DbPool,
    bus: Arc<EventBus>,
    source: ChainSource,
    batch_window: Duration,
    state: Mutex<BatchState>,
    /// Back-reference handed to the batch timer task.
    weak: Weak<LockWriter>,
}

impl LockWriter {
    pub fn new(
        pool: DbPool,
        ha: Arc<HaClient>,
        zwave: Arc<ZwaveJsUiClient>,
        bus: Arc<EventBus>,
        batch_window_seconds: u64,
    ) -> Arc<Self> {
        let batch_window_seconds = if batch_window_seconds == 0 {
            keyway_core::settings::defaults::BATCH_WINDOW_SECONDS
        } else {
            batch_window_seconds
        };

        Arc::new_cyclic(|weak| Self {
            pool,
            bus,
            source: ChainSource::Live { ha, zwave },
            batch_window: Duration::from_secs(batch_window_seconds),
            state: Mutex::new(BatchState {
                queues: HashMap::new(),
                timer_cancel: None,
            }),
            weak: weak.clone(),
        })
    }

    /// Queue a code write.
    pub fn queue_set(&self, lock_id: &str, code: &str, slot: i64, owner: Owner) {
        self.queue(
            lock_id,
            PinOperation {
                slot,
                kind: OpKind::Set,
                code: Some(code.to_string()),
                owner,
            },
        );
    }

    /// Queue a code removal.
    pub fn queue_clear(&self, lock_id: &str, slot: i64, owner: Owner) {
        self.queue(
            lock_id,
            PinOperation {
                slot,
                kind: OpKind::Clear,
                code: None,
                owner,
            },
        );
    }

    fn queue(&self, lock_id: &str, op: PinOperation) {
        let mut state = self.state.lock().expect("writer state lock poisoned");
        let queue = state.queues.entry(lock_id.to_string()).or_default();

        // A clear supersedes this owner's queued set on the same slot, and
        // identical operations coalesce to a single wire attempt.
        if op.kind == OpKind::Clear {
            queue.retain(|q| !(q.kind == OpKind::Set && q.slot == op.slot && q.owner == op.owner));
        }
        if queue.contains(&op) {
            return;
        }
        queue.push(op);

        if state.timer_cancel.is_none() {
            let Some(writer) = self.weak.upgrade() else {
                return;
            };
            let cancel = CancellationToken::new();
            state.timer_cancel = Some(cancel.clone());
            let window = self.batch_window;
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(window) => {
                        writer.flush().await;
                    }
                }
            });
        }
    }

    /// Cancel the batch timer and drain immediately.
    pub async fn flush_now(&self) {
        let cancel = {
            let mut state = self.state.lock().expect("writer state lock poisoned");
            state.timer_cancel.take()
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        self.flush().await;
    }

    /// Drain all queues and execute grouped by lock.
    ///
    /// Draining is atomic, so a timer firing concurrently with `flush_now`
    /// simply finds an empty map.
    async fn flush(&self) {
        let drained = {
            let mut state = self.state.lock().expect("writer state lock poisoned");
            state.timer_cancel = None;
            std::mem::take(&mut state.queues)
        };

        if drained.is_empty() {
            return;
        }

        let snapshot = self.entity_snapshot().await;

        for (lock_id, ops) in drained {
            let lock = match LockRepo::find_by_id(&self.pool, &lock_id).await {
                Ok(Some(lock)) => lock,
                Ok(None) => {
                    tracing::warn!(%lock_id, "Dropping queued operations for unknown lock");
                    continue;
                }
                Err(e) => {
                    tracing::error!(%lock_id, error = %e, "Failed to load lock for batch");
                    continue;
                }
            };

            let chain = self.chain_for(&lock.entity_id, lock.direct_integration.as_deref(), &snapshot);

            for op in ops {
                let result = match op.kind {
                    OpKind::Set => match &op.code {
                        Some(code) => chain.set(op.slot, code).await,
                        None => continue,
                    },
                    OpKind::Clear => chain.clear(op.slot).await,
                };

                let error_message = result.as_ref().err().map(|e| e.to_string());
                if let Some(msg) = &error_message {
                    tracing::error!(
                        %lock_id,
                        slot = op.slot,
                        op = ?op.kind,
                        error = %msg,
                        "Lock write failed"
                    );
                }

                self.record_outcome(&lock_id, &op, error_message.as_deref()).await;
            }
        }
    }

    /// Persist the outcome on the owning assignment row and publish a
    /// `pin.sync_status_changed` event. Payloads carry identifiers only.
    async fn record_outcome(&self, lock_id: &str, op: &PinOperation, error: Option<&str>) {
        let (pin_type, pin_id, status) = match (&op.owner, op.kind, error) {
            (Owner::Guest(id), OpKind::Set, None) => ("guest", id, sync_status::SYNCED),
            (Owner::Guest(id), OpKind::Clear, None) => ("guest", id, sync_status::REMOVED),
            (Owner::Guest(id), _, Some(_)) => ("guest", id, sync_status::FAILED),
            (Owner::Static(id), _, None) => ("static", id, sync_status::SYNCED),
            (Owner::Static(id), _, Some(_)) => ("static", id, sync_status::FAILED),
        };

        let recorded = match &op.owner {
            Owner::Guest(id) => {
                GuestPinRepo::update_assignment_sync(&self.pool, id, lock_id, status, error).await
            }
            Owner::Static(id) => {
                StaticPinRepo::update_assignment_sync(&self.pool, id, lock_id, status).await
            }
        };
        if let Err(e) = recorded {
            tracing::error!(lock_id, error = %e, "Failed to record sync outcome");
        }

        self.bus.publish(
            EngineEvent::new(event_types::PIN_SYNC_STATUS_CHANGED)
                .with_source(format!("{pin_type}_pin"), pin_id.clone())
                .with_payload(serde_json::json!({
                    "pin_id": pin_id,
                    "pin_type": pin_type,
                    "lock_id": lock_id,
                    "slot_number": op.slot,
                    "new_status": status,
                })),
        );
    }

    /// Preload entity states once per drain so direct writes can resolve
    /// node ids without a per-operation round trip.
    async fn entity_snapshot(&self) -> HashMap<String, LockEntity> {
        match &self.source {
            ChainSource::Live { ha, .. } => match ha.get_locks().await {
                Ok(locks) => locks.into_iter().map(|l| (l.entity_id.clone(), l)).collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to fetch entity snapshot; direct writes unavailable this drain");
                    HashMap::new()
                }
            },
            #[cfg(test)]
            ChainSource::Recording { .. } => HashMap::new(),
        }
    }

    /// Select the writer chain for a lock from its declared integration and
    /// the current entity snapshot.
    fn chain_for(
        &self,
        entity_id: &str,
        direct_integration: Option<&str>,
        snapshot: &HashMap<String, LockEntity>,
    ) -> WriterChain {
        match &self.source {
            ChainSource::Live { ha, zwave } => {
                let ha_writer = PinWriter::HomeAssistant {
                    client: Arc::clone(ha),
                    entity_id: entity_id.to_string(),
                };

                if direct_integration == Some(keyway_db::models::lock::direct_integration::ZWAVE_JS_UI) {
                    if let Some(node_id) = snapshot.get(entity_id).and_then(|e| e.attributes.node_id) {
                        tracing::debug!(entity_id, node_id, "Using direct zwave_js_ui with HA fallback");
                        return WriterChain::with_fallback(
                            PinWriter::ZwaveJsUi {
                                client: Arc::clone(zwave),
                                node_id,
                            },
                            ha_writer,
                        );
                    }
                    tracing::debug!(entity_id, "Direct integration requested but node id unknown; using HA");
                }

                WriterChain::single(ha_writer)
            }
            #[cfg(test)]
            ChainSource::Recording {
                recorder,
                with_fallback,
            } => {
                let primary = PinWriter::Recording(Arc::clone(recorder), "primary".to_string());
                if *with_fallback {
                    WriterChain::with_fallback(
                        primary,
                        PinWriter::Recording(Arc::clone(recorder), "fallback".to_string()),
                    )
                } else {
                    WriterChain::single(primary)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
