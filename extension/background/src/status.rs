//! Toolbar badge and the persisted diagnostics ring.

use std::cell::{Cell, RefCell};

use js_sys::Array;
use wasm_bindgen::JsValue;

use crate::chrome::{
    action_set_badge_background_color, action_set_badge_text, action_set_title, object,
    storage_local_set,
};

const LOG_LIMIT: usize = 40;
const STATE_KEY: &str = "tabrun_state";
const LOG_KEY: &str = "tabrun_log";

thread_local! {
    static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static RUNNING: Cell<usize> = const { Cell::new(0) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Running,
    Error,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Running => "running",
            Status::Error => "error",
        }
    }

    fn badge(self, running: usize) -> String {
        match self {
            Status::Idle => String::new(),
            Status::Running => running.to_string(),
            Status::Error => "ERR".to_string(),
        }
    }

    fn color(self) -> [u8; 4] {
        match self {
            Status::Idle => [160, 160, 160, 255],
            Status::Running => [30, 120, 200, 255],
            Status::Error => [200, 40, 40, 255],
        }
    }
}

pub fn set_status(status: Status, title: &str) {
    let running = RUNNING.with(Cell::get);

    action_set_badge_text(&object(&[("text", JsValue::from_str(&status.badge(running)))]));

    let color = Array::new();
    for c in status.color() {
        color.push(&JsValue::from_f64(c as f64));
    }
    action_set_badge_background_color(&object(&[("color", color.into())]));
    action_set_title(&object(&[("title", JsValue::from_str(title))]));

    persist_state(status, title);
}

/// Marks one more batch in flight and returns the new count.
pub fn batch_started() -> usize {
    let running = RUNNING.with(|r| {
        r.set(r.get() + 1);
        r.get()
    });
    set_status(Status::Running, &format!("tabrun: {running} batch(es) running"));
    running
}

pub fn batch_finished(summary: &str) {
    let running = RUNNING.with(|r| {
        r.set(r.get().saturating_sub(1));
        r.get()
    });
    if running == 0 {
        set_status(Status::Idle, summary);
    } else {
        set_status(Status::Running, &format!("tabrun: {running} batch(es) running"));
    }
}

pub fn push_log(line: &str) {
    LOG.with(|log| {
        let mut vec = log.borrow_mut();
        vec.push(line.to_string());
        if vec.len() > LOG_LIMIT {
            let excess = vec.len() - LOG_LIMIT;
            vec.drain(0..excess);
        }
        persist_log(&vec);
    });
}

fn persist_state(status: Status, message: &str) {
    let state = object(&[
        ("status", JsValue::from_str(status.as_str())),
        ("message", JsValue::from_str(message)),
    ]);
    let _ = storage_local_set(&object(&[(STATE_KEY, state)]));
}

fn persist_log(lines: &[String]) {
    let array = Array::new();
    for line in lines {
        array.push(&JsValue::from_str(line));
    }
    let _ = storage_local_set(&object(&[(LOG_KEY, array.into())]));
}
