use std::io::Write;

use strategist_core::config::AppConfig;
use strategist_core::types::ModelTier;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[database]
path = "/tmp/strategist-test/strategist.db"

[models.cheap]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "sk-test-key"
max_tokens = 512

[models.deep]
provider = "anthropic"
model_id = "claude-sonnet-4-20250514"
temperature = 0.3

[models.deep.retry]
max_retries = 5

[http]
timeout_secs = 10
user_agent = "strategist-test"

[channels.telegram]
bot_token = "123:BOT"
default_chat_id = "-1001"

[engine]
fallback_message = "No analysis today."
max_log_payload_chars = 2000

[scheduler]
enabled = false
utc_offset_hours = 3
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(
        config.database_path().to_str(),
        Some("/tmp/strategist-test/strategist.db")
    );
    assert_eq!(config.models.cheap.api_key.as_deref(), Some("sk-test-key"));
    assert_eq!(config.models.cheap.max_tokens, 512);
    assert_eq!(config.models.for_tier(ModelTier::Deep).provider, "anthropic");

    let retry = config.models.deep.retry.expect("retry section");
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.initial_backoff_ms, 1000);

    assert_eq!(config.http.timeout_secs, 10);
    let telegram = config.channels.telegram.expect("telegram section");
    assert_eq!(telegram.default_chat_id.as_deref(), Some("-1001"));

    assert_eq!(config.engine.fallback_message, "No analysis today.");
    assert_eq!(config.engine.dump_header, "Current data:");
    assert_eq!(config.engine.max_log_payload_chars, 2000);
    assert!(!config.scheduler.enabled);
    assert_eq!(config.scheduler.utc_offset_hours, 3);
}

#[test]
fn test_config_round_trips_through_toml() {
    let content = r#"
[models.cheap]
model_id = "gpt-4o-mini"

[models.deep]
model_id = "gpt-4o"
"#;
    let config: AppConfig = toml::from_str(content).expect("parse");
    let rendered = toml::to_string_pretty(&config).expect("render");
    let again: AppConfig = toml::from_str(&rendered).expect("reparse");
    assert_eq!(again.models.deep.model_id, "gpt-4o");
    assert_eq!(again.http.user_agent, config.http.user_agent);
}

#[test]
fn test_missing_models_section_is_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[scheduler]\nenabled = true\n").expect("write toml");
    assert!(AppConfig::load(tmp.path()).is_err());
}
