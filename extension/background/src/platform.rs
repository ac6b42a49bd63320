//! [`ContextPlatform`] over the `chrome.tabs` and `chrome.scripting` APIs.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use gloo_timers::future::TimeoutFuture;
use js_sys::Array;
use serde::Serialize;
use tabrun::{
    ContextChange, ContextPlatform, InjectionReport, LifecycleEvent, LifecycleSubscription,
    ListenerMap, LoadState, PlatformError,
};
use tabrun_protocol::{ActionOutcome, CompletionMessage, ContextId};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{spawn_local, JsFuture};

use crate::chrome::{
    get, get_i32, notifications_create, object, scripting_execute_script, stringify_js_error,
    tabs_create, tabs_get, tabs_on_removed_add_listener, tabs_on_replaced_add_listener,
    tabs_on_updated_add_listener, tabs_remove, tabs_send_message,
};

/// Script file injected into each target tab.
pub const EXECUTOR_SCRIPT: &str = "inject.js";
const NOTIFICATION_ICON: &str = "icons/icon128.png";

/// Handle to the browser's tab APIs.
///
/// Clones share one [`ListenerMap`], fed by [`ChromePlatform::register_tab_events`].
#[derive(Clone, Default)]
pub struct ChromePlatform {
    listeners: ListenerMap,
}

impl ChromePlatform {
    pub fn new(listeners: ListenerMap) -> Self {
        Self { listeners }
    }

    /// Registers the global tab lifecycle listeners. Call once per worker start.
    pub fn register_tab_events(&self) {
        {
            let listeners = self.listeners.clone();
            let on_updated = Closure::<dyn FnMut(JsValue, JsValue, JsValue)>::new(
                move |tab_id: JsValue, change_info: JsValue, _tab: JsValue| {
                    let Some(id) = tab_id.as_f64().map(|v| v as i32) else {
                        return;
                    };
                    let Some(state) = get(&change_info, "status").and_then(|s| parse_status(&s)) else {
                        return;
                    };
                    listeners.dispatch(LifecycleEvent::new(
                        ContextId::new(id),
                        ContextChange::State(state),
                    ));
                },
            );
            tabs_on_updated_add_listener(&on_updated);
            on_updated.forget();
        }

        {
            let listeners = self.listeners.clone();
            let on_removed = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |tab_id: JsValue, _| {
                if let Some(id) = tab_id.as_f64().map(|v| v as i32) {
                    listeners.dispatch(LifecycleEvent::new(ContextId::new(id), ContextChange::Removed));
                }
            });
            tabs_on_removed_add_listener(&on_removed);
            on_removed.forget();
        }

        {
            let listeners = self.listeners.clone();
            let on_replaced =
                Closure::<dyn FnMut(JsValue, JsValue)>::new(move |added: JsValue, removed: JsValue| {
                    let (Some(added), Some(removed)) = (added.as_f64(), removed.as_f64()) else {
                        return;
                    };
                    listeners.dispatch(LifecycleEvent::new(
                        ContextId::new(removed as i32),
                        ContextChange::Replaced {
                            by: ContextId::new(added as i32),
                        },
                    ));
                });
            tabs_on_replaced_add_listener(&on_replaced);
            on_replaced.forget();
        }
    }
}

fn parse_status(value: &JsValue) -> Option<LoadState> {
    match value.as_string()?.as_str() {
        "loading" => Some(LoadState::Loading),
        "complete" => Some(LoadState::Complete),
        _ => None,
    }
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, String> {
    serde_wasm_bindgen::to_value(value).map_err(|e| e.to_string())
}

async fn call(promise: Result<js_sys::Promise, JsValue>) -> Result<JsValue, String> {
    let promise = promise.map_err(stringify_js_error)?;
    JsFuture::from(promise).await.map_err(stringify_js_error)
}

#[async_trait(?Send)]
impl ContextPlatform for ChromePlatform {
    async fn create_context(&self, link: &str) -> Result<ContextId, PlatformError> {
        let fail = |message: String| PlatformError::CreateFailed {
            link: link.to_string(),
            message,
        };
        let properties = object(&[
            ("url", JsValue::from_str(link)),
            ("active", JsValue::FALSE),
        ]);
        let tab = call(tabs_create(&properties)).await.map_err(fail)?;
        get_i32(&tab, "id")
            .map(ContextId::new)
            .ok_or_else(|| fail("created tab has no id".to_string()))
    }

    fn subscribe_lifecycle(&self, context: ContextId) -> LifecycleSubscription {
        self.listeners.subscribe(context)
    }

    async fn context_state(&self, context: ContextId) -> Result<Option<LoadState>, PlatformError> {
        // tabs.get rejects for closed tabs.
        match call(tabs_get(context.get())).await {
            Ok(tab) => Ok(Some(
                get(&tab, "status")
                    .and_then(|s| parse_status(&s))
                    .unwrap_or(LoadState::Loading),
            )),
            Err(message) => {
                tracing::debug!(%context, %message, "tabs.get failed, treating tab as gone");
                Ok(None)
            }
        }
    }

    async fn inject_executor(&self, context: ContextId) -> Result<InjectionReport, PlatformError> {
        let fail = |message: String| PlatformError::InjectionFailed { context, message };
        let files = Array::of1(&JsValue::from_str(EXECUTOR_SCRIPT));
        let injection = object(&[
            ("target", object(&[("tabId", JsValue::from(context.get()))])),
            ("files", files.into()),
        ]);

        let results = call(scripting_execute_script(&injection)).await.map_err(fail)?;
        let first = Array::from(&results).get(0);
        let action = get(&first, "result")
            .and_then(|value| serde_wasm_bindgen::from_value::<ActionOutcome>(value).ok())
            .unwrap_or_default();
        Ok(InjectionReport { action })
    }

    async fn close_context(&self, context: ContextId) -> Result<(), PlatformError> {
        call(tabs_remove(context.get()))
            .await
            .map(drop)
            .map_err(|_| PlatformError::ContextClosed(context))
    }

    async fn send_message(
        &self,
        origin: ContextId,
        message: &CompletionMessage,
    ) -> Result<(), PlatformError> {
        let fail = |message: String| PlatformError::DeliveryFailed {
            context: origin,
            message,
        };
        let payload = to_js(message).map_err(fail)?;

        // Content scripts built before the batch-complete kind still listen for
        // this. Its reply is not awaited.
        if let Ok(legacy) = to_js(&message.to_legacy()) {
            let legacy = call(tabs_send_message(origin.get(), &legacy));
            spawn_local(async move {
                if let Err(err) = legacy.await {
                    tracing::debug!(%origin, error = %err, "legacy notification not delivered");
                }
            });
        }

        call(tabs_send_message(origin.get(), &payload))
            .await
            .map(drop)
            .map_err(fail)
    }

    async fn show_notification(&self, title: &str, message: &str) -> Result<(), PlatformError> {
        let options = object(&[
            ("type", JsValue::from_str("basic")),
            ("iconUrl", JsValue::from_str(NOTIFICATION_ICON)),
            ("title", JsValue::from_str(title)),
            ("message", JsValue::from_str(message)),
        ]);
        call(notifications_create(&options))
            .await
            .map(drop)
            .map_err(PlatformError::NotificationFailed)
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        TimeoutFuture::new(millis).boxed_local()
    }
}
