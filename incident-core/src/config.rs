use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    /// OpenAI-compatible endpoint; `None` means the provider default.
    pub base_url: Option<String>,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            base_url: None,
            temperature: 0.1,
        }
    }
}

/// What to do when nobody answers an approval request in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTimeoutPolicy {
    /// Fail the incident without executing anything.
    #[default]
    Abort,
    /// Treat the silence as a rejection and plan again.
    Replan,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub approval_timeout_secs: u64,
    pub step_timeout_secs: u64,
    /// When false, commands and resolution checks are simulated.
    pub execute_commands: bool,
    pub max_replan_attempts: usize,
    pub approval_timeout_policy: ApprovalTimeoutPolicy,
    pub approval_webhook_url: Option<String>,
    pub event_log_path: String,
    pub listen_addr: String,
    /// How long a resolved or failed incident stays queryable in memory.
    pub snapshot_retention_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            approval_timeout_secs: 300,
            step_timeout_secs: 300,
            execute_commands: false,
            max_replan_attempts: 3,
            approval_timeout_policy: ApprovalTimeoutPolicy::Abort,
            approval_webhook_url: None,
            event_log_path: "incidents.db".into(),
            listen_addr: "0.0.0.0:8080".into(),
            snapshot_retention_secs: 3600,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

impl PipelineConfig {
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn snapshot_retention(&self) -> Duration {
        Duration::from_secs(self.snapshot_retention_secs)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// File named by `INCIDENT_CONFIG` (if any), then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("INCIDENT_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("LLM_API_KEY_ENV") {
            self.llm.api_key_env = v;
        }
        if let Some(v) = lookup("LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = lookup("LLM_TEMPERATURE") {
            self.llm.temperature = parse_value("LLM_TEMPERATURE", v)?;
        }
        if let Some(v) = lookup("APPROVAL_TIMEOUT_SECS") {
            self.approval_timeout_secs = parse_value("APPROVAL_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("EXECUTE_COMMANDS") {
            self.execute_commands = parse_value("EXECUTE_COMMANDS", v.to_lowercase())?;
        }
        if let Some(v) = lookup("APPROVAL_WEBHOOK_URL") {
            self.approval_webhook_url = Some(v);
        }
        if let Some(v) = lookup("INCIDENT_DB") {
            self.event_log_path = v;
        }
        if let Some(v) = lookup("LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = lookup("SNAPSHOT_RETENTION_SECS") {
            self.snapshot_retention_secs = parse_value("SNAPSHOT_RETENTION_SECS", v)?;
        }
        Ok(self)
    }
}

fn parse_value<T: std::str::FromStr>(
    key: &'static str,
    value: String,
) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
