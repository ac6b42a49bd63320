use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::Stream;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{MutationObserver, MutationObserverInit, Node};

/// One item per batch of `childList` mutations under the observed subtree.
///
/// The observer is disconnected when the stream is dropped.
pub struct MutationStream {
    observer: MutationObserver,
    batches: mpsc::UnboundedReceiver<()>,
    _callback: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
}

impl MutationStream {
    pub fn observe(target: &Node) -> Result<Self, JsValue> {
        let (tx, batches) = mpsc::unbounded();
        let callback = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |_records: js_sys::Array, _observer: MutationObserver| {
                let _ = tx.unbounded_send(());
            },
        );
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;

        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer.observe_with_options(target, &init)?;

        Ok(Self {
            observer,
            batches,
            _callback: callback,
        })
    }
}

impl Stream for MutationStream {
    type Item = ();

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<()>> {
        Pin::new(&mut self.batches).poll_next(cx)
    }
}

impl Drop for MutationStream {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}
