use std::path::PathBuf;

use serde_json::{Value, json};
use tabrun_protocol::RequestError;
use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("cannot read {path}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid {what} in {path}")]
	Parse {
		what: &'static str,
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("cannot start the async runtime")]
	Runtime(#[source] std::io::Error),

	#[error("batch rejected")]
	Rejected(#[from] RequestError),

	#[error(transparent)]
	Orchestrator(#[from] tabrun::Error),

	/// Input that parsed but failed a semantic check.
	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	pub fn code(&self) -> ErrorCode {
		match self {
			CliError::Read { .. } => ErrorCode::IoError,
			CliError::Parse { .. } => ErrorCode::InvalidInput,
			CliError::Runtime(_) => ErrorCode::InternalError,
			CliError::Rejected(_) => ErrorCode::RejectedRequest,
			CliError::Orchestrator(err) if err.is_rejected_request() => ErrorCode::RejectedRequest,
			CliError::Anyhow(_) => ErrorCode::InvalidInput,
			CliError::Orchestrator(_) => ErrorCode::InternalError,
		}
	}

	/// Flattens the error chain into one line for the envelope.
	pub fn to_command_error(&self) -> CommandError {
		let mut message = self.to_string();
		let mut source = std::error::Error::source(self);
		while let Some(err) = source {
			let text = err.to_string();
			if !message.contains(&text) {
				message.push_str(": ");
				message.push_str(&text);
			}
			source = err.source();
		}

		CommandError {
			code: self.code(),
			message,
			details: self.details(),
		}
	}

	/// Structured context for scripted consumers.
	fn details(&self) -> Option<Value> {
		match self {
			CliError::Read { path, .. } => Some(json!({ "path": path })),
			CliError::Parse { what, path, source } => Some(json!({
				"path": path,
				"what": what,
				"line": source.line(),
				"column": source.column(),
			})),
			CliError::Rejected(err) => Some(json!({ "reason": err.to_string() })),
			_ => None,
		}
	}
}
