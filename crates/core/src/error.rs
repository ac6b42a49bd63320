//! Error types for the orchestrator.

use tabrun_protocol::{ContextId, RequestError};
use thiserror::Error;

use crate::record::TaskStatus;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by an execution-context platform.
///
/// Platform errors never abort a batch. The watcher that hits one maps it to a
/// failed target and keeps counting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
	/// The platform refused to open a new context.
	#[error("failed to create context for {link}: {message}")]
	CreateFailed { link: String, message: String },

	/// The context no longer exists.
	#[error("context {0} is closed")]
	ContextClosed(ContextId),

	/// Script injection was rejected or threw.
	#[error("injection into {context} failed: {message}")]
	InjectionFailed { context: ContextId, message: String },

	/// The receiving end of a message does not exist (origin closed or navigated away).
	#[error("could not deliver message to {context}: {message}")]
	DeliveryFailed { context: ContextId, message: String },

	/// The platform cannot show notifications.
	#[error("notification failed: {0}")]
	NotificationFailed(String),
}

/// Errors that can occur while running a batch.
#[derive(Debug, Error)]
pub enum Error {
	/// The request was rejected before dispatch; no aggregate was created.
	#[error("invalid batch request: {0}")]
	InvalidRequest(#[from] RequestError),

	/// An aggregate was asked to track zero targets.
	#[error("batch aggregate requires at least one target")]
	EmptyBatch,

	/// A task record was moved along an edge its lifecycle does not allow.
	#[error("illegal task transition {from:?} -> {to:?}")]
	InvalidTransition { from: TaskStatus, to: TaskStatus },

	/// The aggregate was dropped before every target reported in.
	#[error("batch aggregate dropped before every target reported")]
	AggregateDropped,

	#[error(transparent)]
	Platform(#[from] PlatformError),
}

impl Error {
	/// Returns true if the request was rejected before any context was created.
	pub fn is_rejected_request(&self) -> bool {
		matches!(self, Error::InvalidRequest(_) | Error::EmptyBatch)
	}
}
