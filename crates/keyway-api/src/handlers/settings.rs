//! Handlers for the `/settings` resource.

use std::collections::HashMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use keyway_core::error::CoreError;
use keyway_core::schedule::is_valid_hhmm;
use keyway_core::settings::keys;
use keyway_db::repositories::SettingsRepo;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let settings = SettingsRepo::all(&state.pool).await?;
    Ok(Json(DataResponse { data: settings }))
}

/// PUT /api/settings
///
/// Validate and apply a batch of updates. The Z-Wave JS UI URL also swaps
/// the runtime cell so direct writes pick it up without a restart.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(input): Json<HashMap<String, String>>,
) -> AppResult<impl IntoResponse> {
    let current = SettingsRepo::all(&state.pool).await?;
    validate(&input, &current).map_err(AppError::Core)?;

    SettingsRepo::set_many(&state.pool, &input).await?;

    if let Some(url) = input.get(keys::ZWAVE_JS_UI_WS_URL) {
        keyway_locks::config::set_zwave_js_ui_url(url);
        tracing::info!("Z-Wave JS UI URL updated");
    }

    let settings = SettingsRepo::all(&state.pool).await?;
    Ok(Json(DataResponse { data: settings }))
}

fn validate(
    input: &HashMap<String, String>,
    current: &HashMap<String, String>,
) -> Result<(), CoreError> {
    let effective = |key: &str| -> Option<String> {
        input.get(key).or_else(|| current.get(key)).cloned()
    };

    for (key, value) in input {
        match key.as_str() {
            keys::MIN_PIN_LENGTH | keys::MAX_PIN_LENGTH => {
                let parsed: usize = value.parse().map_err(|_| {
                    CoreError::Validation(format!("{key} must be an integer"))
                })?;
                if !(4..=8).contains(&parsed) {
                    return Err(CoreError::Validation(format!("{key} must be 4..=8")));
                }
            }
            keys::CHECKIN_TIME | keys::CHECKOUT_TIME => {
                if !is_valid_hhmm(value) {
                    return Err(CoreError::Validation(format!(
                        "{key} must be zero-padded 24-hour HH:MM"
                    )));
                }
            }
            keys::DEFAULT_SYNC_INTERVAL_MIN | keys::BATCH_WINDOW_SECONDS => {
                let parsed: i64 = value.parse().map_err(|_| {
                    CoreError::Validation(format!("{key} must be an integer"))
                })?;
                if parsed < 1 {
                    return Err(CoreError::Validation(format!("{key} must be positive")));
                }
            }
            keys::BATTERY_EFFICIENT_MODE => {
                if !matches!(value.as_str(), "true" | "false") {
                    return Err(CoreError::Validation(format!(
                        "{key} must be true or false"
                    )));
                }
            }
            keys::ZWAVE_JS_UI_WS_URL => {
                if !value.is_empty()
                    && !(value.starts_with("ws://") || value.starts_with("wss://"))
                {
                    return Err(CoreError::Validation(format!(
                        "{key} must be a ws:// or wss:// URL"
                    )));
                }
            }
            _ => {
                return Err(CoreError::Validation(format!("unknown setting: {key}")));
            }
        }
    }

    // The pair constraint holds across the effective values.
    let min: usize = effective(keys::MIN_PIN_LENGTH)
        .and_then(|v| v.parse().ok())
        .unwrap_or(4);
    let max: usize = effective(keys::MAX_PIN_LENGTH)
        .and_then(|v| v.parse().ok())
        .unwrap_or(8);
    if min > max {
        return Err(CoreError::Validation(
            "min_pin_length must not exceed max_pin_length".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current() -> HashMap<String, String> {
        HashMap::from([
            (keys::MIN_PIN_LENGTH.to_string(), "4".to_string()),
            (keys::MAX_PIN_LENGTH.to_string(), "8".to_string()),
        ])
    }

    #[test]
    fn rejects_unknown_keys() {
        let input = HashMap::from([("mystery".to_string(), "1".to_string())]);
        assert!(validate(&input, &current()).is_err());
    }

    #[test]
    fn rejects_min_above_effective_max() {
        let input = HashMap::from([(keys::MIN_PIN_LENGTH.to_string(), "8".to_string())]);
        assert!(validate(&input, &current()).is_ok());

        let mut shrunk = current();
        shrunk.insert(keys::MAX_PIN_LENGTH.to_string(), "6".to_string());
        assert!(validate(&input, &shrunk).is_err());
    }

    #[test]
    fn rejects_malformed_times_and_urls() {
        let input = HashMap::from([(keys::CHECKIN_TIME.to_string(), "3pm".to_string())]);
        assert!(validate(&input, &current()).is_err());

        let input = HashMap::from([(
            keys::ZWAVE_JS_UI_WS_URL.to_string(),
            "http://nope".to_string(),
        )]);
        assert!(validate(&input, &current()).is_err());

        let input = HashMap::from([(
            keys::ZWAVE_JS_UI_WS_URL.to_string(),
            "ws://controller:3000".to_string(),
        )]);
        assert!(validate(&input, &current()).is_ok());
    }
}
