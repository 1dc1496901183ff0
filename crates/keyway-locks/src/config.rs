//! Transport configuration.
//!
//! The Z-Wave JS UI WebSocket URL lives in a process-wide cell so it can
//! be reconfigured at runtime (add-on option, persisted setting, or the
//! settings API) without a restart.

use std::sync::RwLock;
use std::time::Duration;

/// Configuration for Home Assistant API access.
#[derive(Debug, Clone)]
pub struct HaConfig {
    /// Home Assistant API base URL.
    pub base_url: String,
    /// Long-lived access token.
    pub token: String,
    /// Supervisor API token, set when running as an add-on.
    pub supervisor_token: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HaConfig {
    /// Read configuration from environment variables with add-on defaults.
    pub fn from_env() -> Self {
        Self {
            base_url: env_or("HA_URL", "http://supervisor/core"),
            token: env_or("HA_TOKEN", ""),
            supervisor_token: env_or("SUPERVISOR_TOKEN", ""),
            timeout: Duration::from_secs(30),
        }
    }

    /// Whether the process runs as a Home Assistant add-on.
    pub fn is_addon_mode(&self) -> bool {
        !self.supervisor_token.is_empty()
    }

    /// The token to authenticate with: supervisor token in add-on mode.
    pub fn auth_token(&self) -> &str {
        if self.is_addon_mode() {
            &self.supervisor_token
        } else {
            &self.token
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

static ZWAVE_JS_UI_WS_URL: RwLock<Option<String>> = RwLock::new(None);

fn default_zwave_js_ui_url() -> String {
    env_or("ZWAVE_JS_UI_WS_URL", "ws://localhost:3000")
}

/// Override the runtime Z-Wave JS UI WebSocket URL.
///
/// Accepts `ws://` or `wss://` URLs; an empty value resets to the default.
pub fn set_zwave_js_ui_url(url: &str) {
    let mut cell = ZWAVE_JS_UI_WS_URL.write().expect("zwave url lock poisoned");
    *cell = if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    };
}

/// The currently configured Z-Wave JS UI WebSocket URL.
pub fn zwave_js_ui_url() -> String {
    ZWAVE_JS_UI_WS_URL
        .read()
        .expect("zwave url lock poisoned")
        .clone()
        .unwrap_or_else(default_zwave_js_ui_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zwave_url_override_and_reset() {
        set_zwave_js_ui_url("ws://controller.local:3000");
        assert_eq!(zwave_js_ui_url(), "ws://controller.local:3000");

        set_zwave_js_ui_url("");
        assert_eq!(zwave_js_ui_url(), default_zwave_js_ui_url());
    }
}
