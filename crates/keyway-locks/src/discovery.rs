//! Lock discovery and status refresh against Home Assistant.

use std::sync::Arc;

use keyway_db::models::lock::LockStatusUpdate;
use keyway_db::repositories::LockRepo;
use keyway_db::DbPool;
use keyway_events::{types as event_types, EngineEvent, EventBus};
use serde::Serialize;

use crate::home_assistant::HaClient;
use crate::transport::TransportError;

/// A lock entity eligible for import, as served by the discovery endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredLock {
    pub entity_id: String,
    pub name: String,
    pub state: String,
    pub battery_level: Option<i64>,
    /// Present when the integration exposes a Z-Wave node id; such locks
    /// can use the direct writer.
    pub node_id: Option<i64>,
    /// Whether the entity is already managed.
    pub managed: bool,
}

/// Enumerate `lock.*` entities and mark the ones already managed.
pub async fn discover_locks(
    pool: &DbPool,
    ha: &HaClient,
) -> Result<Vec<DiscoveredLock>, TransportError> {
    let entities = ha.get_locks().await?;

    let mut discovered = Vec::with_capacity(entities.len());
    for entity in entities {
        let managed = LockRepo::find_by_entity_id(pool, &entity.entity_id)
            .await
            .map(|found| found.is_some())
            .unwrap_or(false);

        discovered.push(DiscoveredLock {
            name: entity
                .attributes
                .friendly_name
                .clone()
                .unwrap_or_else(|| entity.entity_id.clone()),
            state: entity.state.clone(),
            battery_level: entity.attributes.battery_level,
            node_id: entity.attributes.node_id,
            managed,
            entity_id: entity.entity_id,
        });
    }

    Ok(discovered)
}

/// Refresh `online`, `lock_state` and `battery_level` for every managed
/// lock from the current entity states, publishing `lock.status_changed`
/// for locks whose observed state changed.
pub async fn refresh_lock_status(
    pool: &DbPool,
    ha: &HaClient,
    bus: &Arc<EventBus>,
) -> Result<(), TransportError> {
    let locks = match LockRepo::list(pool).await {
        Ok(locks) => locks,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list locks for status refresh");
            return Ok(());
        }
    };
    if locks.is_empty() {
        return Ok(());
    }

    let entities = ha.get_locks().await?;
    let states: std::collections::HashMap<_, _> = entities
        .into_iter()
        .map(|e| (e.entity_id.clone(), e))
        .collect();

    for lock in locks {
        let update = match states.get(&lock.entity_id) {
            Some(entity) => LockStatusUpdate {
                online: entity.is_online(),
                lock_state: entity.lock_state().to_string(),
                battery_level: entity.attributes.battery_level,
            },
            None => LockStatusUpdate {
                online: false,
                lock_state: "unknown".to_string(),
                battery_level: None,
            },
        };

        let changed = lock.online != update.online
            || lock.lock_state != update.lock_state
            || lock.battery_level != update.battery_level;

        if let Err(e) = LockRepo::update_status(pool, &lock.id, &update).await {
            tracing::error!(lock_id = %lock.id, error = %e, "Failed to record lock status");
            continue;
        }

        if changed {
            bus.publish(
                EngineEvent::new(event_types::LOCK_STATUS_CHANGED)
                    .with_source("lock", lock.id.clone())
                    .with_payload(serde_json::json!({
                        "lock_id": lock.id,
                        "entity_id": lock.entity_id,
                        "online": update.online,
                        "lock_state": update.lock_state,
                        "battery_level": update.battery_level,
                    })),
            );
        }
    }

    Ok(())
}
