//! Integration tests for configuration validation
//!
//! Verifies that invalid configurations are rejected at startup (Config::from_file())
//! rather than causing runtime errors. Tests the full path: file → parse → validate.

use chatstitch::config::Config;
use chatstitch::error::AppError;
use std::io::Write;
use tempfile::NamedTempFile;

/// Helper to create a temporary config file with given TOML content
fn create_temp_config(toml_content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file
        .write_all(toml_content.as_bytes())
        .expect("Failed to write temp file");
    temp_file.flush().expect("Failed to flush temp file");
    temp_file
}

/// Load `toml_content` and return the validation failure reason
fn validation_reason(toml_content: &str) -> String {
    let temp_file = create_temp_config(toml_content);
    match Config::from_file(temp_file.path()) {
        Err(AppError::ConfigValidationFailed { reason, .. }) => reason,
        other => panic!("expected ConfigValidationFailed, got {:?}", other),
    }
}

#[test]
fn test_config_from_file_accepts_valid_config() {
    let toml_content = r#"
[client]
base_url = "https://chat.example.com"
chat_path = "/v2/chat"
read_timeout_seconds = 120
api_key_env = "CHAT_TOKEN"

[chat]
model = "gpt-4o"
temperature = 0.0
max_tokens = 1
system_prompt = "You are terse."
time_zone = "America/New_York"

[observability]
log_level = "debug"
"#;

    let temp_file = create_temp_config(toml_content);
    let config = Config::from_file(temp_file.path()).expect("valid config should load");

    assert_eq!(config.client.chat_url(), "https://chat.example.com/v2/chat");
    assert_eq!(config.client.api_key_env.as_deref(), Some("CHAT_TOKEN"));
    assert_eq!(config.chat.system_prompt(), Some("You are terse."));
    assert_eq!(config.observability.log_level, "debug");
}

#[test]
fn test_config_from_file_rejects_invalid_base_url_protocol() {
    let reason = validation_reason(
        r#"
[client]
base_url = "ftp://chat.example.com"

[chat]
model = "m"
"#,
    );
    assert!(reason.contains("base_url"), "got: {}", reason);
}

#[test]
fn test_config_from_file_rejects_zero_timeout() {
    let reason = validation_reason(
        r#"
[client]
base_url = "http://localhost:8080"
read_timeout_seconds = 0

[chat]
model = "m"
"#,
    );
    assert!(reason.contains("read_timeout_seconds"), "got: {}", reason);
}

#[test]
fn test_config_from_file_rejects_timeout_above_maximum() {
    let reason = validation_reason(
        r#"
[client]
base_url = "http://localhost:8080"
read_timeout_seconds = 3601

[chat]
model = "m"
"#,
    );
    assert!(reason.contains("3600"), "got: {}", reason);
}

#[test]
fn test_config_from_file_rejects_zero_max_tokens() {
    let reason = validation_reason(
        r#"
[client]
base_url = "http://localhost:8080"

[chat]
model = "m"
max_tokens = 0
"#,
    );
    assert!(reason.contains("max_tokens"), "got: {}", reason);
}

#[test]
fn test_config_from_file_rejects_out_of_range_temperature() {
    let reason = validation_reason(
        r#"
[client]
base_url = "http://localhost:8080"

[chat]
model = "m"
temperature = 2.5
"#,
    );
    assert!(reason.contains("temperature"), "got: {}", reason);
}

#[test]
fn test_config_from_file_rejects_empty_model() {
    let reason = validation_reason(
        r#"
[client]
base_url = "http://localhost:8080"

[chat]
model = "  "
"#,
    );
    assert!(reason.contains("model"), "got: {}", reason);
}

#[test]
fn test_config_from_file_reports_missing_file() {
    let result = Config::from_file("/nonexistent/chatstitch/config.toml");
    assert!(matches!(result, Err(AppError::ConfigFileRead { .. })));
}

#[test]
fn test_config_from_file_reports_parse_errors_with_path() {
    let temp_file = create_temp_config("[client\nbase_url = ");
    let err = Config::from_file(temp_file.path()).unwrap_err();

    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    assert!(
        err.to_string()
            .contains(&temp_file.path().display().to_string()),
        "error should name the file: {}",
        err
    );
}

#[test]
fn test_config_from_file_rejects_missing_chat_section() {
    let temp_file = create_temp_config(
        r#"
[client]
base_url = "http://localhost:8080"
"#,
    );
    assert!(matches!(
        Config::from_file(temp_file.path()),
        Err(AppError::ConfigParseFailed { .. })
    ));
}
