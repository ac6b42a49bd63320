//! Subcommand implementations.

mod config;
mod simulate;
mod validate;

use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use tabrun_protocol::{CONFIG_SCHEMA_VERSION, OrchestratorConfig};

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use crate::output::OutputFormat;

pub use config::ConfigData;
pub use simulate::{SimulateData, summary_lines};
pub use validate::ValidateData;

pub async fn dispatch(cli: Cli, format: OutputFormat) -> Result<()> {
	tracing::debug!(command = cli.command.name(), %format, "dispatching");
	match cli.command {
		Commands::Simulate {
			scenario,
			config,
			realtime,
		} => simulate::run(&scenario, config.as_deref(), realtime, format).await,
		Commands::Validate { links, origin } => validate::run(&links, origin, format),
		Commands::Config { config } => config::run(config.as_deref(), format),
	}
}

/// Reads `path`, treating `-` as stdin.
pub(crate) fn read_input(path: &Path) -> Result<String> {
	let read = if path == Path::new("-") {
		let mut buf = String::new();
		std::io::stdin().read_to_string(&mut buf).map(|_| buf)
	} else {
		std::fs::read_to_string(path)
	};
	read.map_err(|source| CliError::Read {
		path: path.to_path_buf(),
		source,
	})
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path, what: &'static str) -> Result<T> {
	let text = read_input(path)?;
	serde_json::from_str(&text).map_err(|source| CliError::Parse {
		what,
		path: path.to_path_buf(),
		source,
	})
}

/// Loads the config file merged over defaults, or the defaults alone.
pub(crate) fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
	let Some(path) = path else {
		return Ok(OrchestratorConfig::default());
	};
	let config: OrchestratorConfig = read_json(path, "config")?;
	if config.schema > CONFIG_SCHEMA_VERSION {
		return Err(anyhow::anyhow!(
			"{} uses config schema {}, this build understands up to {}",
			path.display(),
			config.schema,
			CONFIG_SCHEMA_VERSION
		)
		.into());
	}
	if config.schema < CONFIG_SCHEMA_VERSION {
		tracing::warn!(path = %path.display(), schema = config.schema, "loading config written for an older schema");
	}
	Ok(config)
}
