//! Per-target task records.

use std::fmt;

use serde::{Deserialize, Serialize};
use tabrun_protocol::{ActionOutcome, ContextId};

use crate::error::{Error, Result};

/// Lifecycle of one target: `Pending -> Loading -> Injecting -> Completed | Failed`.
///
/// `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
	Pending,
	Loading,
	Injecting,
	Completed,
	Failed,
}

impl TaskStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, TaskStatus::Completed | TaskStatus::Failed)
	}

	pub fn can_transition_to(self, next: TaskStatus) -> bool {
		use TaskStatus::*;
		matches!(
			(self, next),
			(Pending, Loading) | (Loading, Injecting) | (Injecting, Completed) | (Pending | Loading | Injecting, Failed)
		)
	}
}

/// Why a target ended up [`TaskStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FailureReason {
	/// The platform could not create the context.
	Dispatch { message: String },
	/// The context was closed before it finished loading.
	ContextClosed,
	/// The context was replaced by another one before it finished loading.
	ContextReplaced { by: ContextId },
	/// The context did not finish loading within the configured timeout.
	LoadTimeout { after_ms: u64 },
	/// The platform rejected the script injection.
	Injection { message: String },
	/// The injected script did not return within the configured timeout.
	InjectionTimeout { after_ms: u64 },
	/// The platform dropped the lifecycle listener without a terminal event.
	SubscriptionEnded,
}

impl fmt::Display for FailureReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FailureReason::Dispatch { message } => write!(f, "could not open context: {message}"),
			FailureReason::ContextClosed => f.write_str("closed before loading finished"),
			FailureReason::ContextReplaced { by } => write!(f, "replaced by {by} before loading finished"),
			FailureReason::LoadTimeout { after_ms } => write!(f, "still loading after {after_ms}ms"),
			FailureReason::Injection { message } => write!(f, "injection failed: {message}"),
			FailureReason::InjectionTimeout { after_ms } => write!(f, "injection did not return within {after_ms}ms"),
			FailureReason::SubscriptionEnded => f.write_str("lifecycle events stopped"),
		}
	}
}

/// State of one target, owned by its completion watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
	/// Position of the target in the original request.
	pub index: usize,
	/// The original target descriptor.
	pub link: String,
	/// Context assigned by the platform; [`None`] until creation succeeds.
	pub target_id: Option<ContextId>,
	pub status: TaskStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failure: Option<FailureReason>,
	#[serde(default)]
	pub action: ActionOutcome,
}

impl TaskRecord {
	pub fn new(index: usize, link: impl Into<String>) -> Self {
		Self {
			index,
			link: link.into(),
			target_id: None,
			status: TaskStatus::Pending,
			failure: None,
			action: ActionOutcome::Unknown,
		}
	}

	/// Moves to `next`, rejecting edges the lifecycle does not allow.
	pub fn transition(&mut self, next: TaskStatus) -> Result<()> {
		if !self.status.can_transition_to(next) {
			return Err(Error::InvalidTransition {
				from: self.status,
				to: next,
			});
		}
		tracing::debug!(link = %self.link, context = ?self.target_id, from = ?self.status, to = ?next, "task transition");
		self.status = next;
		Ok(())
	}

	/// Marks the record failed with `reason`. No-op on terminal records.
	pub fn fail(&mut self, reason: FailureReason) {
		if self.status.is_terminal() {
			return;
		}
		tracing::debug!(link = %self.link, context = ?self.target_id, from = ?self.status, ?reason, "task failed");
		self.status = TaskStatus::Failed;
		self.failure = Some(reason);
	}

	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn happy_path_transitions_are_allowed() {
		let mut record = TaskRecord::new(0, "https://a.example");
		record.transition(TaskStatus::Loading).unwrap();
		record.transition(TaskStatus::Injecting).unwrap();
		record.transition(TaskStatus::Completed).unwrap();
		assert!(record.is_terminal());
	}

	#[test]
	fn completed_cannot_skip_injecting() {
		let mut record = TaskRecord::new(0, "https://a.example");
		record.transition(TaskStatus::Loading).unwrap();
		let err = record.transition(TaskStatus::Completed).unwrap_err();
		assert!(matches!(
			err,
			Error::InvalidTransition {
				from: TaskStatus::Loading,
				to: TaskStatus::Completed
			}
		));
		assert_eq!(record.status, TaskStatus::Loading);
	}

	#[test]
	fn fail_is_sticky_once_terminal() {
		let mut record = TaskRecord::new(1, "https://b.example");
		record.fail(FailureReason::ContextClosed);
		record.fail(FailureReason::SubscriptionEnded);
		assert_eq!(record.status, TaskStatus::Failed);
		assert_eq!(record.failure, Some(FailureReason::ContextClosed));
	}

	#[test]
	fn terminal_states_have_no_outgoing_edges() {
		for next in [TaskStatus::Pending, TaskStatus::Loading, TaskStatus::Injecting, TaskStatus::Completed, TaskStatus::Failed] {
			assert!(!TaskStatus::Completed.can_transition_to(next));
			assert!(!TaskStatus::Failed.can_transition_to(next));
		}
	}
}
