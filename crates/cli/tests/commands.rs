//! Integration tests driving the `tabrun` binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde_json::{Value, json};
use tempfile::TempDir;

fn tabrun_binary() -> PathBuf {
	PathBuf::from(env!("CARGO_BIN_EXE_tabrun"))
}

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
	let path = dir.path().join(name);
	std::fs::write(&path, contents).unwrap();
	path
}

fn run(args: &[&str], stdin: Option<&str>) -> (bool, Value, String) {
	let mut child = Command::new(tabrun_binary())
		.args(args)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.expect("failed to execute tabrun");

	if let Some(input) = stdin {
		child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
	}
	drop(child.stdin.take());

	let output = child.wait_with_output().unwrap();
	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	let parsed = serde_json::from_str::<Value>(&stdout).unwrap_or_else(|_| json!({ "raw": stdout }));
	(output.status.success(), parsed, stderr)
}

fn path_arg(path: &Path) -> &str {
	path.to_str().unwrap()
}

#[test]
fn simulate_reports_the_batch() {
	let dir = TempDir::new().unwrap();
	let scenario = json!({
		"origin": 4,
		"targets": [
			{ "link": "https://shop.test/a", "steps": [{ "atMs": 50, "event": { "type": "complete" } }],
			  "action": { "outcome": "performed", "strategy": "wc-add-to-cart >>> .add-to-cart-btn" } },
			{ "link": "https://shop.test/b", "failToOpen": true },
			{ "link": "https://shop.test/c", "steps": [{ "atMs": 2000, "event": { "type": "complete" } }] }
		]
	});
	let path = write_file(&dir, "scenario.json", &scenario.to_string());

	let (ok, json, stderr) = run(&["simulate", path_arg(&path)], None);

	assert!(ok, "simulate failed: {stderr}");
	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "simulate");
	let report = &json["data"]["report"];
	assert_eq!(report["total"], 3);
	assert_eq!(report["completed"], 2);
	assert_eq!(report["failed"], 1);
	assert_eq!(report["tasks"][1]["failure"]["reason"], "dispatch");
	assert_eq!(report["notification"]["delivered"], true);

	let messages: Vec<&Value> = json["data"]["journal"]
		.as_array()
		.unwrap()
		.iter()
		.filter(|r| r["call"] == "message")
		.collect();
	assert_eq!(messages.len(), 1);
	assert_eq!(messages[0]["atMs"], 2000);
	assert_eq!(messages[0]["message"]["kind"], "batch-complete");
}

#[test]
fn simulate_honours_config_file() {
	let dir = TempDir::new().unwrap();
	let scenario = json!({
		"targets": [{ "link": "https://shop.test/stuck", "steps": [{ "atMs": 0, "event": { "type": "loading" } }] }]
	});
	let scenario = write_file(&dir, "scenario.json", &scenario.to_string());
	let config = write_file(&dir, "config.json", r#"{ "loadTimeoutMs": 1500 }"#);

	let (ok, json, stderr) = run(&["simulate", path_arg(&scenario), "--config", path_arg(&config)], None);

	assert!(ok, "simulate failed: {stderr}");
	let task = &json["data"]["report"]["tasks"][0];
	assert_eq!(task["status"], "failed");
	assert_eq!(task["failure"]["reason"], "loadTimeout");
	assert_eq!(task["failure"]["afterMs"], 1500);
}

#[test]
fn simulate_text_output_summarizes() {
	let dir = TempDir::new().unwrap();
	let scenario = json!({ "targets": [{ "link": "https://shop.test/a", "failToOpen": true }] });
	let path = write_file(&dir, "scenario.json", &scenario.to_string());

	let (ok, json, _) = run(&["-f", "text", "simulate", path_arg(&path)], None);

	assert!(ok);
	let raw = json["raw"].as_str().unwrap();
	assert!(raw.starts_with("batch from tab-1: 0/1 completed, 1 failed"), "{raw}");
}

#[test]
fn simulate_text_offsets_are_exact_milliseconds() {
	let dir = TempDir::new().unwrap();
	let complete_at = |ms: u64| json!([{ "atMs": 0, "event": { "type": "loading" } }, { "atMs": ms, "event": { "type": "complete" } }]);
	let scenario = json!({
		"targets": [
			{ "link": "https://shop.test/a", "steps": complete_at(50) },
			{ "link": "https://shop.test/b", "steps": complete_at(2000) },
		]
	});
	let path = write_file(&dir, "scenario.json", &scenario.to_string());

	let (ok, json, stderr) = run(&["-f", "text", "simulate", path_arg(&path)], None);

	assert!(ok, "simulate failed: {stderr}");
	let raw = json["raw"].as_str().unwrap();
	assert!(raw.starts_with("batch from tab-1: 2/2 completed, 0 failed, finished at 2000ms"), "{raw}");
}

#[test]
fn simulate_missing_file_fails_with_io_error() {
	let (ok, json, stderr) = run(&["simulate", "/nonexistent/scenario.json"], None);

	assert!(!ok);
	assert_eq!(json["ok"], false);
	assert_eq!(json["error"]["code"], "IO_ERROR");
	assert_eq!(json["error"]["details"]["path"], "/nonexistent/scenario.json");
	assert!(stderr.contains("IO_ERROR"), "{stderr}");
}

#[test]
fn simulate_empty_scenario_is_rejected() {
	let dir = TempDir::new().unwrap();
	let path = write_file(&dir, "scenario.json", r#"{ "targets": [] }"#);

	let (ok, json, _) = run(&["simulate", path_arg(&path)], None);

	assert!(!ok);
	assert_eq!(json["error"]["code"], "REJECTED_REQUEST");
}

#[test]
fn validate_reads_links_from_stdin() {
	let (ok, json, _) = run(
		&["validate", "-", "--origin", "12"],
		Some("https://shop.test/a\n\nhttps://shop.test/b\n"),
	);

	assert!(ok);
	assert_eq!(json["data"]["count"], 2);
	assert_eq!(json["data"]["request"]["originContextId"], 12);
	assert_eq!(json["data"]["request"]["targets"][1], "https://shop.test/b");
}

#[test]
fn validate_rejects_empty_list() {
	let (ok, json, stderr) = run(&["validate", "-"], Some("\n   \n"));

	assert!(!ok);
	assert_eq!(json["error"]["code"], "REJECTED_REQUEST");
	assert!(stderr.contains("batch rejected"), "{stderr}");
}

#[test]
fn config_prints_defaults() {
	let (ok, json, _) = run(&["config"], None);

	assert!(ok);
	let config = &json["data"]["config"];
	assert_eq!(config["loadTimeoutMs"], 60000);
	assert_eq!(config["closePolicy"], "never");
	assert_eq!(config["notification"]["title"], "ShopLyft");
	assert!(json["data"].get("source").is_none());
}

#[test]
fn config_rejects_malformed_file() {
	let dir = TempDir::new().unwrap();
	let path = write_file(&dir, "config.json", r#"{ "closePolicy": "sometimes" }"#);

	let (ok, json, _) = run(&["config", "--config", path_arg(&path)], None);

	assert!(!ok);
	assert_eq!(json["error"]["code"], "INVALID_INPUT");
}

#[test]
fn config_from_newer_schema_is_refused() {
	let dir = TempDir::new().unwrap();
	let path = write_file(&dir, "config.json", r#"{ "schema": 99 }"#);

	let (ok, json, stderr) = run(&["config", "--config", path_arg(&path)], None);

	assert!(!ok);
	assert_eq!(json["error"]["code"], "INVALID_INPUT");
	assert!(stderr.contains("schema 99"), "{stderr}");
}
