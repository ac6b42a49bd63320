//! Tracing layer for the service worker.
//!
//! Formats each event as `LEVEL target: message key=value ...`, writes it to
//! the browser console and keeps INFO and above in the persisted log ring.

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use wasm_bindgen::JsValue;

use crate::status::push_log;

pub struct ConsoleLayer;

impl<S> Layer<S> for ConsoleLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = format!("{} {}: {}{}", meta.level(), meta.target(), visitor.message, visitor.fields);
        let js = JsValue::from_str(&line);
        match *meta.level() {
            Level::ERROR => web_sys::console::error_1(&js),
            Level::WARN => web_sys::console::warn_1(&js),
            Level::INFO => web_sys::console::info_1(&js),
            _ => web_sys::console::debug_1(&js),
        }

        if *meta.level() <= Level::INFO {
            push_log(&line);
        }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Installs [`ConsoleLayer`] as the global subscriber at DEBUG.
pub fn init() {
    let subscriber = tracing_subscriber::registry()
        .with(ConsoleLayer.with_filter(tracing_subscriber::filter::LevelFilter::DEBUG));
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        web_sys::console::warn_1(&JsValue::from_str("tracing subscriber already installed"));
    }
}
