use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrategistError};
use crate::types::ModelTier;

/// Top-level Strategist configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String { "~/.strategist/strategist.db".to_string() }

/// The two model tiers a GenerateNode can ask for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub cheap: ModelConfig,
    pub deep: ModelConfig,
}

impl ModelsConfig {
    pub fn for_tier(&self, tier: ModelTier) -> &ModelConfig {
        match tier {
            ModelTier::Cheap => &self.cheap,
            ModelTier::Deep => &self.deep,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Outbound HTTP settings for FetchNodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout() -> u64 { 30 }
fn default_user_agent() -> String { "Strategist/0.3".to_string() }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub log: Option<LogChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Used when a NotifyNode names no chat.
    #[serde(default)]
    pub default_chat_id: Option<String>,
}

/// Append-only notification log file. Used when no Telegram bot is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogChannelConfig {
    #[serde(default = "default_notification_log")]
    pub path: String,
}

impl Default for LogChannelConfig {
    fn default() -> Self {
        Self {
            path: default_notification_log(),
        }
    }
}

fn default_notification_log() -> String { "~/.strategist/notifications.log".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Text substituted for a GenerateNode output when the model call fails.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Heading placed above variable dumps in prompts and notifications.
    #[serde(default = "default_dump_header")]
    pub dump_header: String,
    /// Input/output snapshots in log entries are truncated to this length.
    #[serde(default = "default_max_log_payload_chars")]
    pub max_log_payload_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_message: default_fallback_message(),
            dump_header: default_dump_header(),
            max_log_payload_chars: default_max_log_payload_chars(),
        }
    }
}

fn default_fallback_message() -> String {
    "AI analysis is temporarily unavailable.".to_string()
}
fn default_dump_header() -> String { "Current data:".to_string() }
fn default_max_log_payload_chars() -> usize { 10_000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    /// Schedules are evaluated in UTC shifted by this many hours.
    #[serde(default)]
    pub utc_offset_hours: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            utc_offset_hours: 0,
        }
    }
}

fn default_scheduler_enabled() -> bool { true }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StrategistError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| StrategistError::Config(e.to_string()))
    }

    /// Resolve the database path (expand ~).
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.database.path)
    }
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
