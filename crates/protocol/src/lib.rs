//! Wire types shared by the tabrun orchestrator, its CLI and the browser extension.
//!
//! # Main Types
//!
//! - [`BatchRequest`] - A batch of links submitted by an origin tab
//! - [`RuntimeMessage`] - Extension runtime message envelope
//! - [`CompletionMessage`] - Batch completion signal sent back to the origin
//! - [`LookupRule`] - One pluggable element-lookup rule for the in-page executor
//! - [`OrchestratorConfig`] - Timeouts, close policy, notification text, executor limits

pub mod config;
pub mod lookup;
pub mod messages;

pub use config::{
	ClosePolicy, ExecutorConfig, NotificationConfig, OrchestratorConfig, CONFIG_SCHEMA_VERSION,
	CONFIG_STORAGE_KEY,
};
pub use lookup::{LookupRule, default_rules};
pub use messages::{
	ActionOutcome, BatchRequest, CompletionKind, CompletionMessage, ContextId, RequestError,
	RuntimeMessage,
};
