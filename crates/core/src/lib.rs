//! tabrun - parallel tab orchestration
//!
//! Opens one background execution context per target link, waits for each to
//! finish loading, runs an in-page action executor in it, and tells the origin
//! context exactly once when every target has been attempted.
//!
//! - **Watcher**: per-target pipeline from creation to a single completion report
//! - **Aggregate**: counts completions and fires the batch signal once
//! - **Notifier**: primary message to the origin plus a platform notification
//! - **Executor**: lookup-strategy chain with a bounded, mutation-driven retry
//!
//! # Architecture
//!
//! ```text
//! BatchRequest
//!      │
//! ┌────▼─────────┐  create_context / subscribe / inject
//! │ Orchestrator ├──────────────────────────────┐
//! └────┬─────────┘                              │
//!      │ one CompletionWatcher per target  ┌────▼────────────┐
//!      │                                   │ ContextPlatform │
//! ┌────▼────────────┐                      └────▲────────────┘
//! │ BatchAggregator │ fires once ──► OriginNotifier
//! └─────────────────┘
//! ```
//!
//! The core is single-threaded and never spawns: timers come from
//! [`ContextPlatform::sleep`], so the same code runs on the extension's wasm
//! event loop and on tokio for the scripted platform.

pub mod aggregate;
pub mod error;
pub mod executor;
pub mod listeners;
pub mod notifier;
pub mod orchestrator;
pub mod platform;
pub mod record;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod watcher;

pub use aggregate::{BatchAggregator, BatchCompletion, BatchTally, Recorded};
pub use error::{Error, PlatformError, Result};
pub use executor::{ActionDocument, ActionExecutor, Attempt, ExecutorOutcome, Found, LookupStrategy, StrategyChain};
pub use listeners::{ListenerId, ListenerMap, Subscription};
pub use notifier::{NotifyReport, OriginNotifier};
pub use orchestrator::{BatchReport, Orchestrator};
pub use platform::{ContextChange, ContextPlatform, InjectionReport, LifecycleEvent, LifecycleSubscription, LoadState};
pub use record::{FailureReason, TaskRecord, TaskStatus};
pub use tabrun_protocol as protocol;
pub use watcher::{CompletionWatcher, WatchPolicy, WatchStep};
