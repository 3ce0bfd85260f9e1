//! LLM Client Factory
//!
//! Builds the configured provider behind `Arc<dyn LlmClient>` so callers never
//! depend on a concrete backend.

use std::sync::Arc;

use crate::error::ConfigError;

use super::anthropic_client::AnthropicClient;
use super::backend::{AgentBackend, LlmSettings};
use super::llm_client::LlmClient;
use super::openai_client::OpenAiClient;

/// Create the client selected by `AGENT_BACKEND` and its provider variables
pub fn create_llm_client() -> Result<Arc<dyn LlmClient>, ConfigError> {
    Ok(create_client(LlmSettings::from_env()?))
}

pub fn create_client(settings: LlmSettings) -> Arc<dyn LlmClient> {
    let LlmSettings {
        backend,
        api_key,
        model,
    } = settings;
    let client: Arc<dyn LlmClient> = match backend {
        AgentBackend::Anthropic => Arc::new(AnthropicClient::new(api_key, model)),
        AgentBackend::OpenAi => Arc::new(OpenAiClient::new(api_key, model)),
    };
    tracing::info!(
        provider = client.provider_name(),
        model = client.model_name(),
        "LLM client created"
    );
    client
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client_keeps_provider_and_model() {
        for backend in AgentBackend::ALL {
            let client = create_client(LlmSettings::new(backend, "k"));
            assert_eq!(client.provider_name(), backend.name());
            assert_eq!(client.model_name(), backend.default_model());
        }

        let pinned = create_client(LlmSettings::new(AgentBackend::OpenAi, "k").with_model("gpt-4o-mini"));
        assert_eq!(pinned.model_name(), "gpt-4o-mini");
    }
}
