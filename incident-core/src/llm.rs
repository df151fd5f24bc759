use crate::config::LlmConfig;
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use serde::de::DeserializeOwned;
use thiserror::Error;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A prompt split into the system (role) and user segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReasoningPrompt {
    pub system: String,
    pub user: String,
}

impl ReasoningPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported llm provider '{0}'")]
    UnsupportedProvider(String),
    #[error("missing env var {0}")]
    MissingApiKey(String),
    #[error("llm client error: {0}")]
    Client(String),
    #[error("llm prompt failed: {0}")]
    Prompt(String),
    #[error("reasoning engine is disabled")]
    Disabled,
}

/// Text in, text out. Callers own parsing and fallbacks.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn complete(&self, prompt: &ReasoningPrompt) -> Result<String, EngineError>;
}

pub struct RigEngine {
    client: openai::CompletionsClient,
    model: String,
    temperature: f64,
}

impl RigEngine {
    pub fn from_config(config: &LlmConfig) -> Result<Self, EngineError> {
        if config.provider.to_lowercase() != "openai" {
            return Err(EngineError::UnsupportedProvider(config.provider.clone()));
        }

        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| EngineError::MissingApiKey(config.api_key_env.clone()))?;
        let client = openai::CompletionsClient::builder()
            .api_key(&api_key)
            .base_url(config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL))
            .build()
            .map_err(|e| EngineError::Client(e.to_string()))?;

        Ok(Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ReasoningEngine for RigEngine {
    async fn complete(&self, prompt: &ReasoningPrompt) -> Result<String, EngineError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(&prompt.system)
            .temperature(self.temperature)
            .build();

        let out: Result<String, _> = agent.prompt(prompt.user.as_str()).await;
        out.map_err(|e| EngineError::Prompt(e.to_string()))
    }
}

/// Stand-in when no model is configured. Every stage then takes its
/// fallback path.
pub struct DisabledEngine;

#[async_trait]
impl ReasoningEngine for DisabledEngine {
    async fn complete(&self, _prompt: &ReasoningPrompt) -> Result<String, EngineError> {
        Err(EngineError::Disabled)
    }
}

/// Drop a surrounding markdown code fence (with or without a language tag).
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(strip_code_fences(raw))
}
