//! The execution-context platform seam.
//!
//! Everything the orchestrator needs from the host (tab creation, lifecycle
//! events, script injection, messaging, notifications, timers) goes through
//! [`ContextPlatform`]. The Chrome extension implements it on top of
//! `chrome.tabs`/`chrome.scripting`; tests and the CLI use the scripted
//! platform from [`crate::sim`].

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use futures::channel::mpsc;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use tabrun_protocol::{ActionOutcome, CompletionMessage, ContextId};

use crate::error::PlatformError;
use crate::listeners::Subscription;

/// Load state reported by the platform for a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadState {
	Loading,
	Complete,
}

/// One lifecycle change of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextChange {
	/// Load status changed. `Complete` may be reported more than once across redirects.
	State(LoadState),
	/// The context was closed.
	Removed,
	/// The context was swapped for another one (prerender, instant navigation).
	Replaced { by: ContextId },
}

/// A lifecycle event addressed to one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEvent {
	pub context_id: ContextId,
	pub change: ContextChange,
}

impl LifecycleEvent {
	pub fn new(context_id: ContextId, change: ContextChange) -> Self {
		Self { context_id, change }
	}
}

/// Result of injecting the action executor into a context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionReport {
	/// What the executor reported, [`ActionOutcome::Unknown`] if nothing usable came back.
	pub action: ActionOutcome,
}

/// Stream of lifecycle events for one context, bound to its listener registration.
///
/// The listener is detached when this value is dropped or [`detach`](Self::detach)ed.
pub struct LifecycleSubscription {
	context: ContextId,
	events: mpsc::UnboundedReceiver<LifecycleEvent>,
	guard: Subscription,
}

impl LifecycleSubscription {
	pub fn new(context: ContextId, events: mpsc::UnboundedReceiver<LifecycleEvent>, guard: Subscription) -> Self {
		Self { context, events, guard }
	}

	pub fn context(&self) -> ContextId {
		self.context
	}

	pub fn is_attached(&self) -> bool {
		self.guard.is_active()
	}

	/// Detaches the listener and closes the stream. Idempotent.
	pub fn detach(&mut self) {
		self.guard.detach();
		self.events.close();
	}
}

impl Stream for LifecycleSubscription {
	type Item = LifecycleEvent;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		Pin::new(&mut self.events).poll_next(cx)
	}
}

impl std::fmt::Debug for LifecycleSubscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LifecycleSubscription")
			.field("context", &self.context)
			.field("guard", &self.guard)
			.finish()
	}
}

/// Host operations used by the orchestrator.
///
/// Methods are `?Send`: the production platform runs on the single-threaded
/// extension event loop and every callback executes there.
#[async_trait(?Send)]
pub trait ContextPlatform {
	/// Opens a new, non-focused context navigated to `link`.
	async fn create_context(&self, link: &str) -> Result<ContextId, PlatformError>;

	/// Registers a lifecycle listener scoped to `context`.
	fn subscribe_lifecycle(&self, context: ContextId) -> LifecycleSubscription;

	/// Current load state of `context`, or [`None`] if it no longer exists.
	async fn context_state(&self, context: ContextId) -> Result<Option<LoadState>, PlatformError>;

	/// Injects the action executor and resolves when the injected script has run.
	async fn inject_executor(&self, context: ContextId) -> Result<InjectionReport, PlatformError>;

	async fn close_context(&self, context: ContextId) -> Result<(), PlatformError>;

	/// Sends `message` to the origin context over the primary inter-context channel.
	async fn send_message(&self, origin: ContextId, message: &CompletionMessage) -> Result<(), PlatformError>;

	/// Raises a user-visible platform notification.
	async fn show_notification(&self, title: &str, message: &str) -> Result<(), PlatformError>;

	/// Resolves after `duration` on the platform's timer.
	fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}
