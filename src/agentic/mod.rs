//! Generative text provider seam
//!
//! Every model-backed decision (clarity, intent, clarification questions)
//! goes through [`LlmClient`], so the provider can be swapped without
//! touching the decision logic.

pub mod anthropic_client;
pub mod backend;
pub mod client_factory;
pub mod json_envelope;
pub mod llm_client;
pub mod openai_client;

pub use backend::{AgentBackend, LlmSettings};
pub use client_factory::{create_client, create_llm_client};
pub use llm_client::{CompletionRequest, LlmClient};

use std::time::Duration;

use crate::error::DecisionFailure;

/// Run a completion under a timeout, folding both failure kinds into `DecisionFailure`
pub async fn complete_with_timeout(
    client: &dyn LlmClient,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<String, DecisionFailure> {
    match tokio::time::timeout(timeout, client.complete(request)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(DecisionFailure::Provider(e.to_string())),
        Err(_) => Err(DecisionFailure::Timeout(timeout.as_millis() as u64)),
    }
}
