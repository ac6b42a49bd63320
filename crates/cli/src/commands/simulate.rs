use std::path::Path;

use serde::Serialize;
use tabrun::protocol::ActionOutcome;
use tabrun::sim::{Scenario, SimRecord, run_scenario};
use tabrun::{BatchReport, TaskRecord, TaskStatus};

use super::{load_config, read_json};
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_lines, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateData {
	pub report: BatchReport,
	/// Every platform call, stamped with its offset from batch start.
	pub journal: Vec<SimRecord>,
}

pub async fn run(scenario_path: &Path, config_path: Option<&Path>, realtime: bool, format: OutputFormat) -> Result<()> {
	let scenario: Scenario = read_json(scenario_path, "scenario")?;
	let config = load_config(config_path)?;

	tracing::info!(targets = scenario.targets.len(), origin = %scenario.origin, realtime, "replaying scenario");
	let (report, orchestrator) = run_scenario(scenario, config).await?;
	let journal = orchestrator.platform().journal();

	match format {
		OutputFormat::Json => {
			let data = SimulateData { report, journal };
			print_result(&ResultBuilder::new("simulate").data(data).build(), format);
		}
		OutputFormat::Text => print_lines(summary_lines(&report, &journal)),
	}
	Ok(())
}

/// Human-readable batch summary.
pub fn summary_lines(report: &BatchReport, journal: &[SimRecord]) -> Vec<String> {
	let finished_at = journal.last().map_or(0, |r| r.at_ms);
	let mut lines = vec![format!(
		"batch from {}: {}/{} completed, {} failed, finished at {}ms",
		report.origin, report.completed, report.total, report.failed, finished_at
	)];
	lines.extend(report.tasks.iter().map(task_line));

	let yes_no = |b: bool| if b { "yes" } else { "no" };
	lines.push(format!(
		"origin notified: {}, platform notification: {}",
		yes_no(report.notification.delivered),
		yes_no(report.notification.fallback_shown)
	));
	lines
}

fn task_line(task: &TaskRecord) -> String {
	let context = task.target_id.map_or_else(|| "-".to_string(), |id| id.to_string());
	let detail = match (&task.status, &task.failure, &task.action) {
		(TaskStatus::Failed, Some(reason), _) => reason.to_string(),
		(_, _, ActionOutcome::Performed { strategy }) => format!("action performed via {strategy}"),
		(_, _, ActionOutcome::NotFound) => "no actionable element".to_string(),
		_ => "action outcome unknown".to_string(),
	};
	format!(
		"  [{}] {:<9} {:<8} {} ({})",
		task.index,
		format!("{:?}", task.status).to_lowercase(),
		context,
		task.link,
		detail
	)
}

#[cfg(test)]
mod tests {
	use tabrun::protocol::{ContextId, OrchestratorConfig};
	use tabrun::sim::ScriptedTarget;

	use super::*;

	#[tokio::test(start_paused = true)]
	async fn summary_reports_counts_and_failures() {
		let scenario = Scenario::new(vec![
			ScriptedTarget::loads_after("https://shop.test/a", 50),
			ScriptedTarget::fails_to_open("https://shop.test/b"),
		]);
		let (report, orchestrator) = run_scenario(scenario, OrchestratorConfig::default()).await.unwrap();
		let lines = summary_lines(&report, &orchestrator.platform().journal());

		assert_eq!(lines[0], "batch from tab-1: 1/2 completed, 1 failed, finished at 50ms");
		assert!(lines[1].contains("completed"), "{}", lines[1]);
		assert!(lines[1].contains("action performed via scripted"), "{}", lines[1]);
		assert!(lines[2].contains("could not open context"), "{}", lines[2]);
		assert_eq!(lines[3], "origin notified: yes, platform notification: yes");
		assert_eq!(report.origin, ContextId::new(1));
	}
}
