// End-to-end batches against the scripted platform.
//
// All tests run on tokio's paused clock, so scripted delays are exact and the
// suite finishes instantly.

use std::time::Duration;

use tabrun::protocol::{ActionOutcome, BatchRequest, ClosePolicy, CompletionKind, ContextId, OrchestratorConfig};
use tabrun::sim::{Scenario, ScriptedEvent, ScriptedPlatform, ScriptedTarget, SimCall, run_scenario};
use tabrun::{FailureReason, Orchestrator, TaskStatus};

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter("tabrun=debug")
		.with_test_writer()
		.try_init();
}

fn injected_at(platform: &ScriptedPlatform, context: ContextId) -> Option<u64> {
	platform.journal().iter().find_map(|r| match r.call {
		SimCall::Injected { context: c } if c == context => Some(r.at_ms),
		_ => None,
	})
}

#[tokio::test(start_paused = true)]
async fn three_targets_notify_once_after_the_slowest() {
	init_tracing();
	let scenario = Scenario::new(vec![
		ScriptedTarget::loads_after("https://shop.test/a", 50),
		ScriptedTarget::fails_to_open("https://shop.test/b"),
		ScriptedTarget::loads_after("https://shop.test/c", 2_000),
	]);

	let (report, orchestrator) = run_scenario(scenario, OrchestratorConfig::default()).await.unwrap();
	let platform = orchestrator.platform();

	assert_eq!(report.total, 3);
	assert_eq!(report.completed, 2);
	assert_eq!(report.failed, 1);

	let a = &report.tasks[0];
	let b = &report.tasks[1];
	let c = &report.tasks[2];
	assert_eq!(a.status, TaskStatus::Completed);
	assert!(matches!(b.failure, Some(FailureReason::Dispatch { .. })));
	assert_eq!(c.status, TaskStatus::Completed);

	assert_eq!(injected_at(platform, a.target_id.unwrap()), Some(50));
	assert_eq!(injected_at(platform, c.target_id.unwrap()), Some(2_000));

	let messages = platform.messages();
	assert_eq!(messages.len(), 1);
	let (at_ms, message) = &messages[0];
	assert_eq!(*at_ms, 2_000);
	assert_eq!(message.kind, CompletionKind::BatchComplete);
	assert_eq!(message.human_message, "All items added to cart!");
	assert_eq!(message.completed, 2);
	assert_eq!(message.failed, 1);

	assert_eq!(platform.notifications(), vec![(2_000, "All items added to cart!".to_string())]);
	assert!(report.notification.delivered);
	assert!(report.notification.fallback_shown);
}

#[tokio::test(start_paused = true)]
async fn missing_element_still_completes_the_batch() {
	let scenario = Scenario::new(vec![
		ScriptedTarget::loads_after("https://shop.test/sold-out", 300).action(ActionOutcome::NotFound),
	]);

	let (report, orchestrator) = run_scenario(scenario, OrchestratorConfig::default()).await.unwrap();

	assert_eq!(report.tasks[0].status, TaskStatus::Completed);
	assert_eq!(report.actions_performed(), 0);
	assert_eq!(orchestrator.platform().messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_batch_is_rejected_before_any_work() {
	let orchestrator = Orchestrator::new(ScriptedPlatform::new(Scenario::new(Vec::new())), OrchestratorConfig::default());

	let err = orchestrator
		.run_batch(BatchRequest::new(ContextId::new(1), Vec::new()))
		.await
		.unwrap_err();

	assert!(err.is_rejected_request());
	assert!(orchestrator.platform().journal().is_empty());
}

#[tokio::test(start_paused = true)]
async fn closed_tab_counts_toward_total() {
	let scenario = Scenario::new(vec![
		ScriptedTarget::loads_after("https://shop.test/a", 100),
		ScriptedTarget::with_steps(
			"https://shop.test/closed",
			[(0, ScriptedEvent::Loading), (400, ScriptedEvent::Removed)],
		),
	]);

	let (report, orchestrator) = run_scenario(scenario, OrchestratorConfig::default()).await.unwrap();

	assert_eq!(report.completed, 1);
	assert_eq!(report.failed, 1);
	assert_eq!(report.tasks[1].failure, Some(FailureReason::ContextClosed));
	assert_eq!(orchestrator.platform().messages()[0].0, 400);
}

#[tokio::test(start_paused = true)]
async fn stuck_target_is_force_failed_by_load_timeout() {
	let scenario = Scenario::new(vec![
		ScriptedTarget::loads_after("https://shop.test/a", 100),
		ScriptedTarget::with_steps("https://shop.test/stuck", [(0, ScriptedEvent::Loading)]),
	]);
	let config = OrchestratorConfig {
		load_timeout_ms: Some(5_000),
		..OrchestratorConfig::default()
	};

	let (report, orchestrator) = run_scenario(scenario, config).await.unwrap();

	assert_eq!(report.tasks[1].failure, Some(FailureReason::LoadTimeout { after_ms: 5_000 }));
	assert_eq!(orchestrator.platform().messages()[0].0, 5_000);
}

#[tokio::test(start_paused = true)]
async fn disabled_load_timeout_leaves_batch_open() {
	let scenario = Scenario::new(vec![ScriptedTarget::with_steps(
		"https://shop.test/stuck",
		[(0, ScriptedEvent::Loading)],
	)]);
	let config = OrchestratorConfig {
		load_timeout_ms: None,
		..OrchestratorConfig::default()
	};

	let outcome = tokio::time::timeout(Duration::from_secs(3_600), run_scenario(scenario, config)).await;

	assert!(outcome.is_err(), "batch finished although a target never loaded");
}

#[tokio::test(start_paused = true)]
async fn completion_order_does_not_change_the_outcome() {
	let delays = [[10, 500, 2_000], [2_000, 10, 500], [500, 2_000, 10]];
	let mut outcomes = Vec::new();

	for order in delays {
		let targets = order
			.iter()
			.enumerate()
			.map(|(i, ms)| ScriptedTarget::loads_after(format!("https://shop.test/{i}"), *ms))
			.chain([ScriptedTarget::fails_to_open("https://shop.test/broken")])
			.collect();
		let (report, orchestrator) = run_scenario(Scenario::new(targets), OrchestratorConfig::default())
			.await
			.unwrap();

		let messages = orchestrator.platform().messages();
		assert_eq!(messages.len(), 1);
		outcomes.push((report.completed, report.failed, messages[0].1.clone()));
	}

	assert!(outcomes.windows(2).all(|w| w[0] == w[1]), "{outcomes:?}");
}

#[tokio::test(start_paused = true)]
async fn listeners_are_released_after_the_batch() {
	let scenario = Scenario::new(vec![
		ScriptedTarget::loads_after("https://shop.test/a", 20),
		ScriptedTarget::loads_after("https://shop.test/b", 20),
		ScriptedTarget::with_steps("https://shop.test/c", [(5, ScriptedEvent::Removed)]),
	]);

	let (_, orchestrator) = run_scenario(scenario, OrchestratorConfig::default()).await.unwrap();

	assert_eq!(orchestrator.platform().live_listeners(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_origin_falls_back_to_notification() {
	let mut scenario = Scenario::new(vec![ScriptedTarget::loads_after("https://shop.test/a", 20)]);
	scenario.origin_gone = true;

	let (report, orchestrator) = run_scenario(scenario, OrchestratorConfig::default()).await.unwrap();

	assert!(!report.notification.delivered);
	assert!(report.notification.fallback_shown);
	assert_eq!(orchestrator.platform().notifications().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn on_completion_policy_closes_finished_tabs() {
	let scenario = Scenario::new(vec![
		ScriptedTarget::loads_after("https://shop.test/a", 20),
		ScriptedTarget {
			injection_error: Some("Cannot access a chrome:// URL".to_string()),
			..ScriptedTarget::loads_after("https://shop.test/b", 20)
		},
	]);
	let config = OrchestratorConfig {
		close_policy: ClosePolicy::OnCompletion,
		..OrchestratorConfig::default()
	};

	let (report, orchestrator) = run_scenario(scenario, config).await.unwrap();

	assert_eq!(
		orchestrator.platform().closed_contexts(),
		vec![report.tasks[0].target_id.unwrap()]
	);
}

#[tokio::test(start_paused = true)]
async fn unanswered_origin_still_finishes_the_batch() {
	let mut scenario = Scenario::new(vec![ScriptedTarget::loads_after("https://shop.test/a", 20)]);
	scenario.origin_unresponsive = true;

	let (report, orchestrator) = run_scenario(scenario, OrchestratorConfig::default()).await.unwrap();

	assert!(!report.notification.delivered);
	assert!(report.notification.fallback_shown);
	assert_eq!(orchestrator.platform().notifications(), vec![(20, "All items added to cart!".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn hung_close_does_not_delay_the_signal() {
	let scenario = Scenario::new(vec![ScriptedTarget {
		close_hangs: true,
		..ScriptedTarget::loads_after("https://shop.test/a", 10)
	}]);
	let config = OrchestratorConfig {
		close_policy: ClosePolicy::OnCompletion,
		..OrchestratorConfig::default()
	};

	let finished = tokio::time::timeout(Duration::from_secs(3_600), run_scenario(scenario, config)).await;
	let (report, orchestrator) = finished.expect("batch finished").unwrap();

	assert_eq!(report.completed, 1);
	let messages = orchestrator.platform().messages();
	assert_eq!(messages.len(), 1);
	assert_eq!(messages[0].0, 10);
}
