use serde_json::json;

use super::*;

#[test]
fn success_envelope_has_data_and_no_error() {
	let result = ResultBuilder::new("config").data(json!({ "closePolicy": "never" })).build();

	assert!(result.ok);
	assert_eq!(result.schema_version, SCHEMA_VERSION);
	assert!(result.error.is_none());

	let value = serde_json::to_value(&result).unwrap();
	assert_eq!(value["command"], "config");
	assert_eq!(value["data"]["closePolicy"], "never");
	assert!(value.get("error").is_none());
	assert!(value["timings"]["durationMs"].is_u64());
}

#[test]
fn error_envelope_is_not_ok() {
	let result: CommandResult<()> = ResultBuilder::new("validate")
		.error(CommandError {
			code: ErrorCode::RejectedRequest,
			message: "batch has no targets".to_string(),
			details: Some(json!({ "reason": "empty" })),
		})
		.build();

	assert!(!result.ok);
	let value = serde_json::to_value(&result).unwrap();
	assert_eq!(value["error"]["code"], "REJECTED_REQUEST");
	assert_eq!(value["error"]["message"], "batch has no targets");
	assert_eq!(value["error"]["details"]["reason"], "empty");
	assert!(value.get("data").is_none());
}

#[test]
fn error_code_display_matches_serde() {
	for code in [
		ErrorCode::IoError,
		ErrorCode::InvalidInput,
		ErrorCode::RejectedRequest,
		ErrorCode::InternalError,
	] {
		assert_eq!(serde_json::to_value(code).unwrap(), json!(code.to_string()));
	}
}
