//! Scripted execution-context platform.
//!
//! [`ScriptedPlatform`] replays a [`Scenario`]: each target either fails to
//! open or emits timed lifecycle steps relative to its creation, takes a fixed
//! time to run the injected executor, and reports an action outcome. Every
//! platform call is journaled with its offset from platform start so tests and
//! the CLI can check ordering and timing.
//!
//! Events are delivered by [`ScriptedPlatform::drive`], which must be polled
//! alongside the batch; [`run_scenario`] does that.

use std::cell::RefCell;
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::future::{self, Either, LocalBoxFuture};
use futures::{FutureExt, StreamExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tabrun_protocol::{ActionOutcome, BatchRequest, CompletionMessage, ContextId, OrchestratorConfig};
use tokio::time::Instant;

use crate::error::{PlatformError, Result};
use crate::listeners::ListenerMap;
use crate::orchestrator::{BatchReport, Orchestrator};
use crate::platform::{
	ContextChange, ContextPlatform, InjectionReport, LifecycleEvent, LifecycleSubscription, LoadState,
};

const FIRST_CONTEXT_ID: i32 = 100;

/// A lifecycle step emitted `atMs` after the context was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedStep {
	pub at_ms: u64,
	pub event: ScriptedEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScriptedEvent {
	Loading,
	Complete,
	Removed,
	Replaced { by: i32 },
}

impl ScriptedEvent {
	fn into_change(self) -> ContextChange {
		match self {
			ScriptedEvent::Loading => ContextChange::State(LoadState::Loading),
			ScriptedEvent::Complete => ContextChange::State(LoadState::Complete),
			ScriptedEvent::Removed => ContextChange::Removed,
			ScriptedEvent::Replaced { by } => ContextChange::Replaced { by: ContextId::new(by) },
		}
	}
}

/// Scripted behavior of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedTarget {
	pub link: String,
	#[serde(default)]
	pub fail_to_open: bool,
	/// State reported by `context_state` right after creation.
	#[serde(default)]
	pub initial_state: Option<LoadState>,
	#[serde(default)]
	pub steps: Vec<ScriptedStep>,
	/// Time the injected executor takes before reporting back.
	#[serde(default)]
	pub injection_ms: u64,
	/// Injection never returns.
	#[serde(default)]
	pub injection_hangs: bool,
	#[serde(default)]
	pub injection_error: Option<String>,
	#[serde(default)]
	pub action: ActionOutcome,
	/// Closing this tab never returns.
	#[serde(default)]
	pub close_hangs: bool,
}

impl ScriptedTarget {
	/// A target that loads after `load_ms` and whose action fires.
	pub fn loads_after(link: impl Into<String>, load_ms: u64) -> Self {
		Self {
			link: link.into(),
			fail_to_open: false,
			initial_state: None,
			steps: vec![
				ScriptedStep {
					at_ms: 0,
					event: ScriptedEvent::Loading,
				},
				ScriptedStep {
					at_ms: load_ms,
					event: ScriptedEvent::Complete,
				},
			],
			injection_ms: 0,
			injection_hangs: false,
			injection_error: None,
			action: ActionOutcome::Performed {
				strategy: "scripted".to_string(),
			},
			close_hangs: false,
		}
	}

	/// A target whose context cannot be created.
	pub fn fails_to_open(link: impl Into<String>) -> Self {
		Self {
			fail_to_open: true,
			steps: Vec::new(),
			..Self::loads_after(link, 0)
		}
	}

	/// A target that emits `steps` and never anything else.
	pub fn with_steps(link: impl Into<String>, steps: impl IntoIterator<Item = (u64, ScriptedEvent)>) -> Self {
		Self {
			steps: steps.into_iter().map(|(at_ms, event)| ScriptedStep { at_ms, event }).collect(),
			..Self::loads_after(link, 0)
		}
	}

	pub fn injection_ms(mut self, ms: u64) -> Self {
		self.injection_ms = ms;
		self
	}

	pub fn action(mut self, action: ActionOutcome) -> Self {
		self.action = action;
		self
	}
}

/// A complete scripted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
	#[serde(default = "default_origin")]
	pub origin: ContextId,
	pub targets: Vec<ScriptedTarget>,
	/// The origin tab is gone, so primary delivery fails.
	#[serde(default)]
	pub origin_gone: bool,
	/// Messages to the origin are never answered.
	#[serde(default)]
	pub origin_unresponsive: bool,
	#[serde(default)]
	pub notifications_unavailable: bool,
}

fn default_origin() -> ContextId {
	ContextId::new(1)
}

impl Scenario {
	pub fn new(targets: Vec<ScriptedTarget>) -> Self {
		Self {
			origin: default_origin(),
			targets,
			origin_gone: false,
			origin_unresponsive: false,
			notifications_unavailable: false,
		}
	}

	/// The batch request this scenario submits.
	pub fn request(&self) -> BatchRequest {
		BatchRequest::new(self.origin, self.targets.iter().map(|t| t.link.clone()).collect())
	}
}

/// One journaled platform call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SimCall {
	Created { link: String, context: ContextId },
	CreateFailed { link: String },
	Injected { context: ContextId },
	Closed { context: ContextId },
	Message { origin: ContextId, message: CompletionMessage, delivered: bool },
	Notification { title: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimRecord {
	pub at_ms: u64,
	#[serde(flatten)]
	pub call: SimCall,
}

#[derive(Debug)]
struct SimContext {
	target: usize,
	state: Option<LoadState>,
}

#[derive(Debug, Default)]
struct SimState {
	next_id: i32,
	claimed: Vec<bool>,
	contexts: IndexMap<ContextId, SimContext>,
	journal: Vec<SimRecord>,
}

struct Scheduled {
	at: Instant,
	event: LifecycleEvent,
}

/// Execution-context platform that replays a [`Scenario`] on tokio timers.
pub struct ScriptedPlatform {
	scenario: Scenario,
	listeners: ListenerMap,
	started: Instant,
	state: RefCell<SimState>,
	schedule_tx: mpsc::UnboundedSender<Scheduled>,
	schedule_rx: RefCell<Option<mpsc::UnboundedReceiver<Scheduled>>>,
}

impl ScriptedPlatform {
	pub fn new(scenario: Scenario) -> Self {
		let (schedule_tx, schedule_rx) = mpsc::unbounded();
		let state = SimState {
			next_id: FIRST_CONTEXT_ID,
			claimed: vec![false; scenario.targets.len()],
			..Default::default()
		};
		Self {
			scenario,
			listeners: ListenerMap::new(),
			started: Instant::now(),
			state: RefCell::new(state),
			schedule_tx,
			schedule_rx: RefCell::new(Some(schedule_rx)),
		}
	}

	pub fn scenario(&self) -> &Scenario {
		&self.scenario
	}

	/// Delivers scheduled lifecycle events at their due time.
	///
	/// Runs until the platform is dropped; poll it next to the batch.
	pub async fn drive(&self) {
		let Some(mut rx) = self.schedule_rx.borrow_mut().take() else {
			tracing::warn!("scripted platform is already being driven");
			return;
		};

		let mut pending: Vec<Scheduled> = Vec::new();
		loop {
			pending.sort_by_key(|s| s.at);
			let wait = match pending.first() {
				Some(next) => Either::Left(tokio::time::sleep_until(next.at)),
				None => Either::Right(future::pending::<()>()),
			};
			let wait = pin!(wait);

			match future::select(rx.next(), wait).await {
				Either::Left((Some(scheduled), _)) => pending.push(scheduled),
				Either::Left((None, _)) => return,
				Either::Right(_) => {
					let due = pending.remove(0);
					self.apply(due.event);
				}
			}
		}
	}

	fn apply(&self, event: LifecycleEvent) {
		{
			let mut state = self.state.borrow_mut();
			let Some(context) = state.contexts.get_mut(&event.context_id) else {
				return;
			};
			if context.state.is_none() {
				// Closed tabs emit nothing.
				return;
			}
			context.state = match event.change {
				ContextChange::State(load) => Some(load),
				ContextChange::Removed | ContextChange::Replaced { .. } => None,
			};
		}
		let reached = self.listeners.dispatch(event);
		tracing::trace!(context = %event.context_id, change = ?event.change, reached, "scripted event");
	}

	fn elapsed_ms(&self) -> u64 {
		self.started.elapsed().as_millis() as u64
	}

	fn log(&self, call: SimCall) {
		let at_ms = self.elapsed_ms();
		self.state.borrow_mut().journal.push(SimRecord { at_ms, call });
	}

	fn target_for(&self, context: ContextId) -> Option<ScriptedTarget> {
		let state = self.state.borrow();
		let index = state.contexts.get(&context)?.target;
		self.scenario.targets.get(index).cloned()
	}

	pub fn journal(&self) -> Vec<SimRecord> {
		self.state.borrow().journal.clone()
	}

	/// Completion messages sent to the origin, with their offsets.
	pub fn messages(&self) -> Vec<(u64, CompletionMessage)> {
		self.state
			.borrow()
			.journal
			.iter()
			.filter_map(|r| match &r.call {
				SimCall::Message { message, .. } => Some((r.at_ms, message.clone())),
				_ => None,
			})
			.collect()
	}

	pub fn notifications(&self) -> Vec<(u64, String)> {
		self.state
			.borrow()
			.journal
			.iter()
			.filter_map(|r| match &r.call {
				SimCall::Notification { message, .. } => Some((r.at_ms, message.clone())),
				_ => None,
			})
			.collect()
	}

	pub fn closed_contexts(&self) -> Vec<ContextId> {
		self.state
			.borrow()
			.journal
			.iter()
			.filter_map(|r| match r.call {
				SimCall::Closed { context } => Some(context),
				_ => None,
			})
			.collect()
	}

	/// Lifecycle listeners still attached.
	pub fn live_listeners(&self) -> usize {
		self.listeners.len()
	}
}

#[async_trait(?Send)]
impl ContextPlatform for ScriptedPlatform {
	async fn create_context(&self, link: &str) -> std::result::Result<ContextId, PlatformError> {
		let now = Instant::now();
		let (context, target) = {
			let mut state = self.state.borrow_mut();
			let index = self
				.scenario
				.targets
				.iter()
				.enumerate()
				.position(|(i, t)| t.link == link && !state.claimed[i]);
			let Some(index) = index else {
				drop(state);
				self.log(SimCall::CreateFailed { link: link.to_string() });
				return Err(PlatformError::CreateFailed {
					link: link.to_string(),
					message: "link not in scenario".to_string(),
				});
			};
			state.claimed[index] = true;

			let target = &self.scenario.targets[index];
			if target.fail_to_open {
				drop(state);
				self.log(SimCall::CreateFailed { link: link.to_string() });
				return Err(PlatformError::CreateFailed {
					link: link.to_string(),
					message: "scripted failure".to_string(),
				});
			}

			let context = ContextId::new(state.next_id);
			state.next_id += 1;
			state.contexts.insert(
				context,
				SimContext {
					target: index,
					state: Some(target.initial_state.unwrap_or(LoadState::Loading)),
				},
			);
			(context, target)
		};

		for step in &target.steps {
			let scheduled = Scheduled {
				at: now + Duration::from_millis(step.at_ms),
				event: LifecycleEvent::new(context, step.event.into_change()),
			};
			// A closed receiver means nobody drives this platform; events are lost.
			let _ = self.schedule_tx.unbounded_send(scheduled);
		}

		self.log(SimCall::Created {
			link: link.to_string(),
			context,
		});
		Ok(context)
	}

	fn subscribe_lifecycle(&self, context: ContextId) -> LifecycleSubscription {
		self.listeners.subscribe(context)
	}

	async fn context_state(&self, context: ContextId) -> std::result::Result<Option<LoadState>, PlatformError> {
		Ok(self.state.borrow().contexts.get(&context).and_then(|c| c.state))
	}

	async fn inject_executor(&self, context: ContextId) -> std::result::Result<InjectionReport, PlatformError> {
		self.log(SimCall::Injected { context });
		let target = self.target_for(context).ok_or(PlatformError::ContextClosed(context))?;

		if target.injection_hangs {
			future::pending::<()>().await;
		}
		if target.injection_ms > 0 {
			tokio::time::sleep(Duration::from_millis(target.injection_ms)).await;
		}
		if let Some(message) = target.injection_error {
			return Err(PlatformError::InjectionFailed { context, message });
		}
		Ok(InjectionReport { action: target.action })
	}

	async fn close_context(&self, context: ContextId) -> std::result::Result<(), PlatformError> {
		if self.target_for(context).is_some_and(|t| t.close_hangs) {
			future::pending::<()>().await;
		}
		let was_open = {
			let mut state = self.state.borrow_mut();
			match state.contexts.get_mut(&context) {
				Some(c) => c.state.take().is_some(),
				None => false,
			}
		};
		if !was_open {
			return Err(PlatformError::ContextClosed(context));
		}
		self.log(SimCall::Closed { context });
		self.listeners.dispatch(LifecycleEvent::new(context, ContextChange::Removed));
		Ok(())
	}

	async fn send_message(&self, origin: ContextId, message: &CompletionMessage) -> std::result::Result<(), PlatformError> {
		let delivered = !self.scenario.origin_gone && !self.scenario.origin_unresponsive;
		self.log(SimCall::Message {
			origin,
			message: message.clone(),
			delivered,
		});
		if self.scenario.origin_unresponsive {
			future::pending::<()>().await;
		}
		if delivered {
			Ok(())
		} else {
			Err(PlatformError::DeliveryFailed {
				context: origin,
				message: "Could not establish connection. Receiving end does not exist.".to_string(),
			})
		}
	}

	async fn show_notification(&self, title: &str, message: &str) -> std::result::Result<(), PlatformError> {
		if self.scenario.notifications_unavailable {
			return Err(PlatformError::NotificationFailed("notifications API unavailable".to_string()));
		}
		self.log(SimCall::Notification {
			title: title.to_string(),
			message: message.to_string(),
		});
		Ok(())
	}

	fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
		tokio::time::sleep(duration).boxed_local()
	}
}

/// Runs `scenario` through an [`Orchestrator`] while driving its events.
///
/// Returns the report together with the orchestrator so the platform journal
/// can be inspected.
pub async fn run_scenario(
	scenario: Scenario,
	config: OrchestratorConfig,
) -> Result<(BatchReport, Orchestrator<ScriptedPlatform>)> {
	let request = scenario.request();
	let orchestrator = Orchestrator::new(ScriptedPlatform::new(scenario), config);

	let report = {
		let run = pin!(orchestrator.run_batch(request));
		let drive = pin!(orchestrator.platform().drive());
		match future::select(run, drive).await {
			Either::Left((report, _)) => report,
			Either::Right((_, run)) => run.await,
		}
	};

	report.map(|report| (report, orchestrator))
}
