//! Messages exchanged between the page, the extension background and the CLI.
//!
//! The flow for one batch is:
//!
//! 1. The page (or popup) sends [`RuntimeMessage::AddToCart`] with a list of links
//! 2. The background wraps it into a [`BatchRequest`] addressed by the sender tab
//! 3. Once every link has been attempted the background sends a
//!    [`CompletionMessage`] (and the legacy [`RuntimeMessage::ShowNotification`])
//!    back to the origin tab

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier of an execution context (a browser tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(i32);

impl ContextId {
	pub const fn new(raw: i32) -> Self {
		Self(raw)
	}

	/// Returns the platform's raw tab id.
	pub const fn get(self) -> i32 {
		self.0
	}
}

impl fmt::Display for ContextId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "tab-{}", self.0)
	}
}

/// Reasons a [`BatchRequest`] is rejected before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
	#[error("batch request contains no targets")]
	Empty,

	#[error("target #{index} is blank")]
	BlankTarget { index: usize },
}

/// A batch of links to open, each in its own background tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
	/// Tab that issued the request and expects the completion signal.
	pub origin_context_id: ContextId,
	/// Links in submission order. Order is kept for diagnostics only.
	pub targets: Vec<String>,
}

impl BatchRequest {
	pub fn new(origin_context_id: ContextId, targets: Vec<String>) -> Self {
		Self {
			origin_context_id,
			targets,
		}
	}

	/// Builds a request from newline-separated text, trimming each line and
	/// dropping blank ones.
	pub fn from_lines(origin_context_id: ContextId, text: &str) -> Self {
		let targets = text
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty())
			.map(str::to_string)
			.collect();
		Self::new(origin_context_id, targets)
	}

	/// Rejects empty batches and blank targets.
	pub fn validate(&self) -> Result<(), RequestError> {
		if self.targets.is_empty() {
			return Err(RequestError::Empty);
		}
		if let Some(index) = self.targets.iter().position(|t| t.trim().is_empty()) {
			return Err(RequestError::BlankTarget { index });
		}
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.targets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.targets.is_empty()
	}
}

/// Runtime message envelope used by `chrome.runtime.sendMessage` and
/// `chrome.tabs.sendMessage`, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RuntimeMessage {
	/// Inbound batch submission. The origin is the sender tab.
	AddToCart {
		#[serde(default)]
		links: Vec<String>,
	},
	/// Outbound banner request understood by the page content script.
	ShowNotification { message: String },
}

impl RuntimeMessage {
	/// Turns an inbound submission into a [`BatchRequest`] for `origin`.
	///
	/// Returns [`None`] for messages that are not batch submissions.
	pub fn into_batch_request(self, origin: ContextId) -> Option<BatchRequest> {
		match self {
			RuntimeMessage::AddToCart { links } => Some(BatchRequest::new(origin, links)),
			RuntimeMessage::ShowNotification { .. } => None,
		}
	}
}

/// Kind tag of a [`CompletionMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionKind {
	BatchComplete,
}

/// Signal delivered to the origin tab once every target has been attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
	pub kind: CompletionKind,
	pub human_message: String,
	#[serde(default)]
	pub completed: usize,
	#[serde(default)]
	pub failed: usize,
}

impl CompletionMessage {
	pub fn batch_complete(human_message: impl Into<String>, completed: usize, failed: usize) -> Self {
		Self {
			kind: CompletionKind::BatchComplete,
			human_message: human_message.into(),
			completed,
			failed,
		}
	}

	/// Legacy form for content scripts that only understand `showNotification`.
	pub fn to_legacy(&self) -> RuntimeMessage {
		RuntimeMessage::ShowNotification {
			message: self.human_message.clone(),
		}
	}
}

/// What the in-page executor reported after injection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ActionOutcome {
	/// The action fired using the named lookup rule.
	Performed { strategy: String },
	/// The executor gave up without finding an actionable element.
	NotFound,
	/// No usable result came back from the injected script.
	#[default]
	Unknown,
}

impl ActionOutcome {
	pub fn is_performed(&self) -> bool {
		matches!(self, ActionOutcome::Performed { .. })
	}
}
