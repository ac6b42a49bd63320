//! tabrun background service worker.
//!
//! Receives `addToCart` requests from content scripts and the popup, runs each as a batch
//! through the orchestrator on the worker's event loop, and reports progress
//! on the toolbar badge.

mod chrome;
mod config;
mod console;
mod platform;
mod status;

use std::cell::RefCell;

use js_sys::Array;
use tabrun::{BatchReport, Orchestrator};
use tabrun_protocol::{BatchRequest, ContextId, RuntimeMessage};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::chrome::{
    get, get_i32, object, runtime_on_message_add_listener, stringify_js_error, tabs_query,
};
pub use crate::platform::ChromePlatform;
use crate::status::{batch_finished, batch_started, set_status, Status};

thread_local! {
    static PLATFORM: RefCell<Option<ChromePlatform>> = const { RefCell::new(None) };
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    console::init();
    set_status(Status::Idle, "tabrun ready");

    let platform = ChromePlatform::default();
    platform.register_tab_events();
    PLATFORM.with(|p| *p.borrow_mut() = Some(platform));

    let on_message = Closure::<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>::new(
        |message: JsValue, sender: JsValue, _send_response: JsValue| {
            handle_message(message, sender);
            // No asynchronous response.
            JsValue::FALSE
        },
    );
    runtime_on_message_add_listener(&on_message);
    on_message.forget();

    tracing::info!("background worker started");
}

/// `chrome.tabs.TAB_ID_NONE`: messages to it fail, leaving only the
/// platform notification.
const TAB_ID_NONE: i32 = -1;

fn handle_message(message: JsValue, sender: JsValue) {
    let runtime = match serde_wasm_bindgen::from_value::<RuntimeMessage>(message) {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring runtime message");
            return;
        }
    };
    if !matches!(runtime, RuntimeMessage::AddToCart { .. }) {
        return;
    }

    let Some(platform) = PLATFORM.with(|p| p.borrow().clone()) else {
        tracing::error!("batch received before the worker finished starting");
        return;
    };

    let sender_tab = get(&sender, "tab").and_then(|tab| get_i32(&tab, "id"));
    wasm_bindgen_futures::spawn_local(async move {
        // The popup has no sender tab; its batch reports to the tab the user is looking at.
        let active = match sender_tab {
            Some(_) => None,
            None => active_tab().await,
        };
        let origin = choose_origin(sender_tab, active);
        let Some(request) = runtime.into_batch_request(origin) else {
            return;
        };

        if let Err(err) = request.validate() {
            tracing::warn!(%origin, error = %err, "batch rejected");
            set_status(Status::Error, &format!("tabrun: {err}"));
            return;
        }
        run_batch(platform, request).await;
    });
}

fn choose_origin(sender_tab: Option<i32>, active_tab: Option<i32>) -> ContextId {
    match sender_tab.or(active_tab) {
        Some(id) => ContextId::new(id),
        None => {
            tracing::warn!("no origin tab, completion goes to the platform notification only");
            ContextId::new(TAB_ID_NONE)
        }
    }
}

async fn active_tab() -> Option<i32> {
    let query = object(&[
        ("active", JsValue::TRUE),
        ("lastFocusedWindow", JsValue::TRUE),
    ]);
    let promise = tabs_query(&query).map_err(stringify_js_error);
    let tabs = match promise {
        Ok(promise) => JsFuture::from(promise).await.map_err(stringify_js_error),
        Err(err) => Err(err),
    };
    match tabs {
        Ok(tabs) => Array::from(&tabs).iter().find_map(|tab| get_i32(&tab, "id")),
        Err(err) => {
            tracing::debug!(error = %err, "active tab lookup failed");
            None
        }
    }
}

async fn run_batch(platform: ChromePlatform, request: BatchRequest) {
    let config = config::load().await;
    let running = batch_started();
    tracing::info!(origin = %request.origin_context_id, targets = request.len(), running, "batch accepted");

    let orchestrator = Orchestrator::new(platform, config);
    match orchestrator.run_batch(request).await {
        Ok(report) => batch_finished(&summary(&report)),
        Err(err) => {
            tracing::error!(error = %err, "batch aborted");
            batch_finished("tabrun: last batch aborted");
            set_status(Status::Error, &format!("tabrun: {err}"));
        }
    }
}

fn summary(report: &BatchReport) -> String {
    format!(
        "tabrun: {}/{} added ({} failed)",
        report.actions_performed(),
        report.total,
        report.failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_tab_wins_over_active_tab() {
        assert_eq!(choose_origin(Some(7), Some(3)), ContextId::new(7));
    }

    #[test]
    fn popup_batches_report_to_the_active_tab() {
        assert_eq!(choose_origin(None, Some(3)), ContextId::new(3));
        assert_eq!(choose_origin(None, None), ContextId::new(TAB_ID_NONE));
    }
}
