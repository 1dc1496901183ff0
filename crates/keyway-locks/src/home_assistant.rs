//! REST client for the Home Assistant lock surface.
//!
//! Wraps the entity-state and service-call endpoints used by the writer
//! and by discovery. PIN codes are sent in request bodies only and never
//! logged.

use serde::Deserialize;

use crate::config::HaConfig;
use crate::transport::TransportError;

/// A `lock.*` entity as reported by `GET /api/states`.
#[derive(Debug, Clone, Deserialize)]
pub struct LockEntity {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: LockAttributes,
}

/// Attributes of a lock entity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LockAttributes {
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub battery_level: Option<i64>,
    /// Z-Wave node id, present when the integration exposes it.
    #[serde(default)]
    pub node_id: Option<i64>,
}

impl LockEntity {
    /// Whether the entity is reachable.
    pub fn is_online(&self) -> bool {
        self.state != "unavailable" && self.state != "unknown"
    }

    /// Map the HA state string onto the stored lock_state domain.
    pub fn lock_state(&self) -> &'static str {
        match self.state.as_str() {
            "locked" => "locked",
            "unlocked" | "open" => "unlocked",
            "jammed" => "jammed",
            _ => "unknown",
        }
    }
}

/// HTTP client for the Home Assistant API.
pub struct HaClient {
    client: reqwest::Client,
    config: HaConfig,
}

impl HaClient {
    pub fn new(config: HaConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { client, config }
    }

    /// Retrieve all lock entities.
    pub async fn get_locks(&self) -> Result<Vec<LockEntity>, TransportError> {
        let url = format!("{}/api/states", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.auth_token())
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let states: Vec<serde_json::Value> = response.json().await?;

        let locks = states
            .into_iter()
            .filter(|s| {
                s.get("entity_id")
                    .and_then(|e| e.as_str())
                    .is_some_and(|e| e.starts_with("lock."))
            })
            .filter_map(|s| serde_json::from_value::<LockEntity>(s).ok())
            .collect();

        Ok(locks)
    }

    /// Program a user code into a slot via the lock service.
    pub async fn set_user_code(
        &self,
        entity_id: &str,
        slot: i64,
        code: &str,
    ) -> Result<(), TransportError> {
        self.call_service(
            "lock",
            "set_usercode",
            serde_json::json!({
                "entity_id": entity_id,
                "code_slot": slot,
                "usercode": code,
            }),
        )
        .await
    }

    /// Remove a user code from a slot via the lock service.
    pub async fn clear_user_code(&self, entity_id: &str, slot: i64) -> Result<(), TransportError> {
        self.call_service(
            "lock",
            "clear_usercode",
            serde_json::json!({
                "entity_id": entity_id,
                "code_slot": slot,
            }),
        )
        .await
    }

    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> Result<(), TransportError> {
        let url = format!("{}/api/services/{domain}/{service}", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.auth_token())
            .json(&data)
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    /// Map non-2xx responses onto [`TransportError::Api`] with a truncated
    /// body for diagnostics. Service-call bodies are never echoed back by
    /// HA, so no code can leak here.
    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        body.truncate(200);
        Err(TransportError::Api {
            status: status.as_u16(),
            body,
        })
    }
}
