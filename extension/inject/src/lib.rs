//! In-page action executor, injected into each target tab.
//!
//! The exported [`run`] resolves to the serialized [`ActionOutcome`], which
//! `chrome.scripting.executeScript` hands back to the background worker.

mod document;
mod observer;

use futures::future::{self, Either};
use futures::stream;
use gloo_timers::future::TimeoutFuture;
use tabrun::ActionExecutor;
use tabrun_protocol::{ActionOutcome, ExecutorConfig, OrchestratorConfig, CONFIG_STORAGE_KEY};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::Node;

pub use crate::document::{strategy_chain, CssStrategy, ShadowStrategy, WebDocument};
pub use crate::observer::MutationStream;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = get, catch)]
    fn storage_local_get(keys: &JsValue) -> Result<js_sys::Promise, JsValue>;
}

fn log(line: &str) {
    web_sys::console::log_1(&JsValue::from_str(&format!("[tabrun] {line}")));
}

#[wasm_bindgen]
pub async fn run() -> JsValue {
    console_error_panic_hook::set_once();
    let outcome = execute().await;
    serde_wasm_bindgen::to_value(&outcome).unwrap_or(JsValue::UNDEFINED)
}

async fn execute() -> ActionOutcome {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return ActionOutcome::Unknown;
    };
    let config = load_executor_config().await;
    let doc = WebDocument::new(document);
    let executor = ActionExecutor::new(strategy_chain(&config.rules), config.max_mutation_batches);

    let target: Node = match doc.document().body() {
        Some(body) => body.into(),
        None => doc.document().clone().into(),
    };
    let mutations = match MutationStream::observe(&target) {
        Ok(stream) => Either::Left(stream),
        Err(err) => {
            log(&format!("mutation observer unavailable: {err:?}"));
            Either::Right(stream::empty::<()>())
        }
    };
    let deadline = match config.deadline() {
        Some(deadline) => {
            Either::Left(TimeoutFuture::new(u32::try_from(deadline.as_millis()).unwrap_or(u32::MAX)))
        }
        None => Either::Right(future::pending::<()>()),
    };

    let outcome = executor.run(&doc, mutations, deadline).await;
    log(&format!("{outcome:?}"));
    outcome.to_action_outcome()
}

async fn load_executor_config() -> ExecutorConfig {
    let Ok(promise) = storage_local_get(&JsValue::from_str(CONFIG_STORAGE_KEY)) else {
        return ExecutorConfig::default();
    };
    let Ok(items) = JsFuture::from(promise).await else {
        return ExecutorConfig::default();
    };
    let stored = js_sys::Reflect::get(&items, &JsValue::from_str(CONFIG_STORAGE_KEY))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null());

    match stored.map(serde_wasm_bindgen::from_value::<OrchestratorConfig>) {
        Some(Ok(config)) => config.executor,
        Some(Err(err)) => {
            log(&format!("stored config is invalid, using default rules: {err}"));
            ExecutorConfig::default()
        }
        None => ExecutorConfig::default(),
    }
}
