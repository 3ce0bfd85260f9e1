//! Provider resolution
//!
//! `AGENT_BACKEND` picks the provider; its key and optional model override
//! come from the provider's own variables.

use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentBackend {
    #[default]
    Anthropic,
    OpenAi,
}

impl AgentBackend {
    pub const ALL: [AgentBackend; 2] = [AgentBackend::Anthropic, AgentBackend::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "anthropic",
            AgentBackend::OpenAi => "openai",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "Anthropic",
            AgentBackend::OpenAi => "OpenAI",
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "ANTHROPIC_API_KEY",
            AgentBackend::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn model_var(&self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "ANTHROPIC_MODEL",
            AgentBackend::OpenAi => "OPENAI_MODEL",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "claude-sonnet-4-20250514",
            AgentBackend::OpenAi => "gpt-4o",
        }
    }
}

impl FromStr for AgentBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(AgentBackend::Anthropic),
            "openai" | "gpt" => Ok(AgentBackend::OpenAi),
            other => Err(ConfigError::invalid(
                "AGENT_BACKEND",
                format!("unknown backend '{}' (anthropic, claude, openai, gpt)", other),
            )),
        }
    }
}

impl std::fmt::Display for AgentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Everything needed to build a client
#[derive(Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub backend: AgentBackend,
    pub api_key: String,
    pub model: String,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("backend", &self.backend)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl LlmSettings {
    pub fn new(backend: AgentBackend, api_key: impl Into<String>) -> Self {
        Self {
            backend,
            api_key: api_key.into(),
            model: backend.default_model().to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Resolve from the process environment (after `.env`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Resolve from a lookup function; blank values count as unset
    pub fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("AGENT_BACKEND") {
            Some(raw) => raw.parse()?,
            None => AgentBackend::default(),
        };
        let api_key = get(backend.api_key_var())
            .ok_or_else(|| ConfigError::invalid(backend.api_key_var(), "not set"))?;

        let settings = Self::new(backend, api_key.trim());
        Ok(match get(backend.model_var()) {
            Some(model) => settings.with_model(model.trim()),
            None => settings,
        })
    }
}
