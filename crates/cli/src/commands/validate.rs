use std::path::Path;

use serde::Serialize;
use tabrun_protocol::{BatchRequest, ContextId};

use super::read_input;
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_lines, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateData {
	pub request: BatchRequest,
	pub count: usize,
}

pub fn run(path: &Path, origin: i32, format: OutputFormat) -> Result<()> {
	let text = read_input(path)?;
	let request = parse_request(&text, origin)?;
	tracing::info!(origin = %request.origin_context_id, targets = request.len(), "request accepted");

	match format {
		OutputFormat::Json => {
			let data = ValidateData {
				count: request.len(),
				request,
			};
			print_result(&ResultBuilder::new("validate").data(data).build(), format);
		}
		OutputFormat::Text => {
			let header = format!("{} target(s) from {}", request.len(), request.origin_context_id);
			print_lines(std::iter::once(header).chain(request.targets.iter().map(|t| format!("  {t}"))));
		}
	}
	Ok(())
}

fn parse_request(text: &str, origin: i32) -> Result<BatchRequest> {
	let request = BatchRequest::from_lines(ContextId::new(origin), text);
	request.validate()?;
	Ok(request)
}
