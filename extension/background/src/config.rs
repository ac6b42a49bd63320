use tabrun_protocol::{OrchestratorConfig, CONFIG_STORAGE_KEY};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

use crate::chrome::{get, storage_local_get, stringify_js_error};

/// Reads the orchestrator config from extension storage.
///
/// Missing or unparsable configs fall back to the defaults.
pub async fn load() -> OrchestratorConfig {
    let items = match JsFuture::from(storage_local_get(&JsValue::from_str(CONFIG_STORAGE_KEY))).await {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(error = %stringify_js_error(err), "config storage unavailable, using defaults");
            return OrchestratorConfig::default();
        }
    };

    let Some(stored) = get(&items, CONFIG_STORAGE_KEY) else {
        tracing::debug!("no stored config, using defaults");
        return OrchestratorConfig::default();
    };

    match serde_wasm_bindgen::from_value::<OrchestratorConfig>(stored) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "stored config is invalid, using defaults");
            OrchestratorConfig::default()
        }
    }
}
