//! Completion watcher: one per dispatched target.
//!
//! Bridges platform lifecycle events for a single context into exactly one
//! [`BatchAggregator::record_completion`] call. Every path out of
//! [`CompletionWatcher::run`] (creation failure, tab closed, timeout, injection
//! error, success) ends in that call, so a bad target never holds the batch open.

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::StreamExt;
use futures::future::{self, Either};
use tabrun_protocol::{ClosePolicy, ContextId, OrchestratorConfig};

use crate::aggregate::BatchAggregator;
use crate::platform::{ContextChange, ContextPlatform, LifecycleEvent, LifecycleSubscription, LoadState};
use crate::record::{FailureReason, TaskRecord, TaskStatus};

/// How long closing a finished target may take before the watcher gives up on it.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeouts and close policy applied by every watcher in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPolicy {
	pub load_timeout: Option<Duration>,
	pub injection_timeout: Option<Duration>,
	pub close_policy: ClosePolicy,
}

impl WatchPolicy {
	pub fn from_config(config: &OrchestratorConfig) -> Self {
		Self {
			load_timeout: config.load_timeout(),
			injection_timeout: config.injection_timeout(),
			close_policy: config.close_policy,
		}
	}

	/// No timeouts, never close.
	pub fn unbounded() -> Self {
		Self {
			load_timeout: None,
			injection_timeout: None,
			close_policy: ClosePolicy::Never,
		}
	}
}

impl Default for WatchPolicy {
	fn default() -> Self {
		Self::from_config(&OrchestratorConfig::default())
	}
}

/// Decision taken for one lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStep {
	/// Not for this target, not a qualifying state, or already handled.
	Ignore,
	/// First fully-loaded state: detach and inject.
	Inject,
	/// The context went away before loading finished.
	Abort(FailureReason),
}

/// Watches one target from creation to its single completion report.
pub struct CompletionWatcher<'a, P: ContextPlatform + ?Sized> {
	platform: &'a P,
	aggregate: &'a BatchAggregator,
	policy: WatchPolicy,
	record: TaskRecord,
	armed: bool,
}

impl<'a, P: ContextPlatform + ?Sized> CompletionWatcher<'a, P> {
	pub fn new(platform: &'a P, aggregate: &'a BatchAggregator, policy: WatchPolicy, index: usize, link: impl Into<String>) -> Self {
		Self {
			platform,
			aggregate,
			policy,
			record: TaskRecord::new(index, link),
			armed: false,
		}
	}

	pub fn record(&self) -> &TaskRecord {
		&self.record
	}

	/// True while the watcher is still waiting for its first qualifying event.
	pub fn is_armed(&self) -> bool {
		self.armed
	}

	/// Runs the whole pipeline and returns the terminal record.
	pub async fn run(mut self) -> TaskRecord {
		if let Some(mut subscription) = self.dispatch().await {
			let context = subscription.context();
			match self.await_loaded(&mut subscription).await {
				Ok(()) => self.inject(context).await,
				Err(reason) => self.record.fail(reason),
			}
		}
		self.finish().await
	}

	/// Asks the platform for a new background context and registers the
	/// lifecycle listener for it.
	///
	/// Returns [`None`] (and marks the record failed) if creation fails.
	pub async fn dispatch(&mut self) -> Option<LifecycleSubscription> {
		match self.platform.create_context(&self.record.link).await {
			Ok(context) => {
				self.record.target_id = Some(context);
				self.advance(TaskStatus::Loading);
				self.armed = true;
				tracing::debug!(%context, link = %self.record.link, "context created");
				Some(self.platform.subscribe_lifecycle(context))
			}
			Err(err) => {
				tracing::warn!(link = %self.record.link, error = %err, "context creation failed");
				self.record.fail(FailureReason::Dispatch { message: err.to_string() });
				None
			}
		}
	}

	/// Classifies one lifecycle event.
	///
	/// Only the first fully-loaded (or terminal) event for this watcher's own
	/// context produces a step; the armed flag makes repeats inert.
	pub fn on_context_state_change(&mut self, event: &LifecycleEvent) -> WatchStep {
		if !self.armed || Some(event.context_id) != self.record.target_id {
			return WatchStep::Ignore;
		}

		match event.change {
			ContextChange::State(LoadState::Loading) => WatchStep::Ignore,
			ContextChange::State(LoadState::Complete) => {
				self.armed = false;
				WatchStep::Inject
			}
			ContextChange::Removed => {
				self.armed = false;
				WatchStep::Abort(FailureReason::ContextClosed)
			}
			ContextChange::Replaced { by } => {
				self.armed = false;
				WatchStep::Abort(FailureReason::ContextReplaced { by })
			}
		}
	}

	async fn await_loaded(&mut self, subscription: &mut LifecycleSubscription) -> Result<(), FailureReason> {
		let platform = self.platform;
		let timeout = self.policy.load_timeout;
		let outcome = with_deadline(platform, timeout, self.next_qualifying(subscription)).await;
		subscription.detach();

		match outcome {
			Some(result) => result,
			None => {
				self.armed = false;
				let after_ms = timeout.map_or(0, |t| t.as_millis() as u64);
				tracing::warn!(context = ?self.record.target_id, link = %self.record.link, after_ms, "load timed out");
				Err(FailureReason::LoadTimeout { after_ms })
			}
		}
	}

	async fn next_qualifying(&mut self, subscription: &mut LifecycleSubscription) -> Result<(), FailureReason> {
		let context = subscription.context();

		// The listener is attached already, so a load that finished before
		// subscribing is caught here and later events are still queued.
		let initial = match self.platform.context_state(context).await {
			Ok(Some(state)) => Some(ContextChange::State(state)),
			Ok(None) => Some(ContextChange::Removed),
			Err(err) => {
				tracing::debug!(%context, error = %err, "initial state query failed");
				None
			}
		};
		if let Some(change) = initial {
			match self.on_context_state_change(&LifecycleEvent::new(context, change)) {
				WatchStep::Ignore => {}
				WatchStep::Inject => return Ok(()),
				WatchStep::Abort(reason) => return Err(reason),
			}
		}

		while let Some(event) = subscription.next().await {
			match self.on_context_state_change(&event) {
				WatchStep::Ignore => continue,
				WatchStep::Inject => return Ok(()),
				WatchStep::Abort(reason) => return Err(reason),
			}
		}

		self.armed = false;
		Err(FailureReason::SubscriptionEnded)
	}

	async fn inject(&mut self, context: ContextId) {
		self.advance(TaskStatus::Injecting);

		let timeout = self.policy.injection_timeout;
		match with_deadline(self.platform, timeout, self.platform.inject_executor(context)).await {
			Some(Ok(report)) => {
				tracing::debug!(%context, action = ?report.action, "injection finished");
				self.record.action = report.action;
				self.advance(TaskStatus::Completed);
			}
			Some(Err(err)) => {
				tracing::warn!(%context, error = %err, "injection failed");
				self.record.fail(FailureReason::Injection { message: err.to_string() });
			}
			None => {
				let after_ms = timeout.map_or(0, |t| t.as_millis() as u64);
				tracing::warn!(%context, after_ms, "injection timed out");
				self.record.fail(FailureReason::InjectionTimeout { after_ms });
			}
		}
	}

	async fn finish(self) -> TaskRecord {
		// Counted before closing: a close that never settles must not hold the batch open.
		self.aggregate.record_completion(&self.record);

		if let Some(context) = self.record.target_id.filter(|_| self.should_close()) {
			match with_deadline(self.platform, Some(CLOSE_TIMEOUT), self.platform.close_context(context)).await {
				Some(Ok(())) => {}
				Some(Err(err)) => tracing::debug!(%context, error = %err, "closing target context failed"),
				None => tracing::warn!(%context, "closing target context timed out"),
			}
		}

		self.record
	}

	fn should_close(&self) -> bool {
		let gone = matches!(
			self.record.failure,
			Some(FailureReason::ContextClosed | FailureReason::ContextReplaced { .. })
		);
		match self.policy.close_policy {
			ClosePolicy::Never => false,
			ClosePolicy::OnCompletion => self.record.status == TaskStatus::Completed,
			ClosePolicy::Always => !gone,
		}
	}

	fn advance(&mut self, next: TaskStatus) {
		if let Err(err) = self.record.transition(next) {
			tracing::error!(link = %self.record.link, error = %err, "watcher state machine violated");
		}
	}
}

/// Awaits `fut`, giving up after `timeout` on the platform's timer.
///
/// Returns [`None`] if the deadline won.
pub(crate) async fn with_deadline<P, F>(platform: &P, timeout: Option<Duration>, fut: F) -> Option<F::Output>
where
	P: ContextPlatform + ?Sized,
	F: Future,
{
	let fut = pin!(fut);
	match timeout {
		None => Some(fut.await),
		Some(timeout) => match future::select(fut, platform.sleep(timeout)).await {
			Either::Left((output, _)) => Some(output),
			Either::Right(_) => None,
		},
	}
}
