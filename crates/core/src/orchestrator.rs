//! Batch orchestration.
//!
//! `run_batch` fans a request out into one [`CompletionWatcher`] per target,
//! joins them through a [`BatchAggregator`] and notifies the origin once.
//! Nothing is spawned: all pipelines are polled on the caller's executor, so
//! the orchestrator runs unchanged on the wasm event loop and under tokio.

use futures::future;
use serde::{Deserialize, Serialize};
use tabrun_protocol::{BatchRequest, ContextId, OrchestratorConfig};

use crate::aggregate::BatchAggregator;
use crate::error::Result;
use crate::notifier::{NotifyReport, OriginNotifier};
use crate::platform::ContextPlatform;
use crate::record::{TaskRecord, TaskStatus};
use crate::watcher::{CompletionWatcher, WatchPolicy};

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
	pub origin: ContextId,
	pub total: usize,
	/// Targets that reached `Completed`.
	pub completed: usize,
	/// Targets that ended `Failed`.
	pub failed: usize,
	/// Per-target records in request order.
	pub tasks: Vec<TaskRecord>,
	pub notification: NotifyReport,
}

impl BatchReport {
	/// Targets whose in-page action is known to have fired.
	pub fn actions_performed(&self) -> usize {
		self.tasks.iter().filter(|t| t.action.is_performed()).count()
	}

	pub fn failures(&self) -> impl Iterator<Item = &TaskRecord> {
		self.tasks.iter().filter(|t| t.status == TaskStatus::Failed)
	}
}

/// Runs batches against one platform.
pub struct Orchestrator<P: ContextPlatform> {
	platform: P,
	config: OrchestratorConfig,
}

impl<P: ContextPlatform> Orchestrator<P> {
	pub fn new(platform: P, config: OrchestratorConfig) -> Self {
		Self { platform, config }
	}

	pub fn platform(&self) -> &P {
		&self.platform
	}

	pub fn config(&self) -> &OrchestratorConfig {
		&self.config
	}

	/// Opens every target, runs its pipeline and signals the origin once all
	/// targets have been attempted.
	///
	/// # Errors
	///
	/// Rejects empty requests (and blank targets) before any context or
	/// aggregate is created. Per-target failures never surface here; they are
	/// reported in [`BatchReport::tasks`].
	pub async fn run_batch(&self, request: BatchRequest) -> Result<BatchReport> {
		request.validate()?;

		let origin = request.origin_context_id;
		let (aggregate, completion) = BatchAggregator::create(origin, request.len())?;
		let policy = WatchPolicy::from_config(&self.config);
		tracing::info!(%origin, targets = request.len(), "dispatching batch");

		let pipelines = future::join_all(
			request
				.targets
				.iter()
				.enumerate()
				.map(|(index, link)| CompletionWatcher::new(&self.platform, &aggregate, policy, index, link.clone()).run()),
		);

		let notifier = OriginNotifier::new(&self.platform, &self.config.notification);
		let signal = async {
			let tally = completion.await?;
			let report = notifier.notify_batch(&tally).await;
			Ok::<_, crate::error::Error>((tally, report))
		};

		let (tasks, signalled) = future::join(pipelines, signal).await;
		let (tally, notification) = signalled?;

		Ok(BatchReport {
			origin,
			total: tally.total,
			completed: tally.succeeded,
			failed: tally.failed,
			tasks,
			notification,
		})
	}
}
