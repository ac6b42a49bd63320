//! Orchestrator configuration.
//!
//! Every field carries a serde default so that partial documents (for example a
//! config object stored by an older extension build) still load.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lookup::{LookupRule, default_rules};

/// Schema version for persisted configuration.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Key under which the extension keeps its configuration in `chrome.storage.local`.
pub const CONFIG_STORAGE_KEY: &str = "tabrun_config";

const DEFAULT_LOAD_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_INJECTION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_MUTATION_BATCHES: usize = 500;
const DEFAULT_EXECUTOR_DEADLINE_MS: u64 = 20_000;

/// What to do with a target tab once its pipeline is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClosePolicy {
	/// Leave every tab open.
	#[default]
	Never,
	/// Close tabs that reached `Completed`.
	OnCompletion,
	/// Close every tab that was created, including failed ones.
	Always,
}

/// Text used for the completion signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationConfig {
	/// Title of the platform notification.
	pub title: String,
	/// Message delivered to the origin tab.
	pub batch_message: String,
	/// Body of the platform notification. `None` reuses `batch_message`.
	pub fallback_message: Option<String>,
}

impl Default for NotificationConfig {
	fn default() -> Self {
		Self {
			title: "ShopLyft".to_string(),
			batch_message: "All items added to cart!".to_string(),
			fallback_message: None,
		}
	}
}

/// Limits and lookup rules for the in-page action executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
	/// Number of mutation batches to re-check before giving up.
	pub max_mutation_batches: usize,
	/// Overall deadline for finding the element. `None` waits indefinitely.
	pub deadline_ms: Option<u64>,
	/// Ordered lookup rules.
	pub rules: Vec<LookupRule>,
}

impl Default for ExecutorConfig {
	fn default() -> Self {
		Self {
			max_mutation_batches: DEFAULT_MAX_MUTATION_BATCHES,
			deadline_ms: Some(DEFAULT_EXECUTOR_DEADLINE_MS),
			rules: default_rules(),
		}
	}
}

impl ExecutorConfig {
	pub fn deadline(&self) -> Option<Duration> {
		self.deadline_ms.map(Duration::from_millis)
	}
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
	pub schema: u32,
	/// Force-fail a target that has not finished loading after this long.
	/// `None` waits for as long as the tab stays open.
	pub load_timeout_ms: Option<u64>,
	/// Force-fail a target whose script injection has not returned after this long.
	pub injection_timeout_ms: Option<u64>,
	pub close_policy: ClosePolicy,
	pub notification: NotificationConfig,
	pub executor: ExecutorConfig,
}

impl Default for OrchestratorConfig {
	fn default() -> Self {
		Self {
			schema: CONFIG_SCHEMA_VERSION,
			load_timeout_ms: Some(DEFAULT_LOAD_TIMEOUT_MS),
			injection_timeout_ms: Some(DEFAULT_INJECTION_TIMEOUT_MS),
			close_policy: ClosePolicy::default(),
			notification: NotificationConfig::default(),
			executor: ExecutorConfig::default(),
		}
	}
}

impl OrchestratorConfig {
	pub fn load_timeout(&self) -> Option<Duration> {
		self.load_timeout_ms.map(Duration::from_millis)
	}

	pub fn injection_timeout(&self) -> Option<Duration> {
		self.injection_timeout_ms.map(Duration::from_millis)
	}

	/// Parses a JSON document, filling missing fields with defaults.
	pub fn from_json(json: &str) -> serde_json::Result<Self> {
		serde_json::from_str(json)
	}
}
