use std::path::Path;

use serde::Serialize;
use tabrun_protocol::OrchestratorConfig;

use super::load_config;
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_lines, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
	/// Path the config was read from; absent for built-in defaults.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	pub config: OrchestratorConfig,
}

pub fn run(path: Option<&Path>, format: OutputFormat) -> Result<()> {
	let config = load_config(path)?;

	match format {
		OutputFormat::Json => {
			let data = ConfigData {
				source: path.map(|p| p.display().to_string()),
				config,
			};
			print_result(&ResultBuilder::new("config").data(data).build(), format);
		}
		OutputFormat::Text => print_lines(text_lines(&config)),
	}
	Ok(())
}

fn text_lines(config: &OrchestratorConfig) -> Vec<String> {
	let ms = |v: Option<u64>| v.map_or_else(|| "none".to_string(), |ms| format!("{ms}ms"));
	let mut lines = vec![
		format!("load timeout:       {}", ms(config.load_timeout_ms)),
		format!("injection timeout:  {}", ms(config.injection_timeout_ms)),
		format!("close policy:       {:?}", config.close_policy),
		format!("notification title: {}", config.notification.title),
		format!("batch message:      {}", config.notification.batch_message),
		format!("executor deadline:  {}", ms(config.executor.deadline_ms)),
		format!("mutation batches:   {}", config.executor.max_mutation_batches),
		"lookup rules:".to_string(),
	];
	lines.extend(config.executor.rules.iter().map(|rule| format!("  {}", rule.label())));
	lines
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn text_lists_every_rule() {
		let config = OrchestratorConfig::default();
		let lines = text_lines(&config);
		assert_eq!(lines.last().map(String::as_str), Some("  button[class*=\"add-to-cart\"]"));
		assert!(lines.iter().any(|l| l == "  wc-add-to-cart >>> .add-to-cart-btn"));
		assert!(lines.contains(&"load timeout:       60000ms".to_string()));
	}
}
