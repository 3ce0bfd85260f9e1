//! Clarity Gate
//!
//! Steps, in order, each short-circuiting:
//! 1. Empty input
//! 2. Answer to a pending clarification question (combined with the original)
//! 3. Action-verb allow-list fast path
//! 4. Unclear-pattern rules
//! 5. LLM assessment against the clarity threshold
//!
//! Step 5 is fail-open: a provider error, timeout or unparseable answer yields
//! a clear verdict at reduced confidence.

use std::sync::Arc;
use std::time::Duration;

use crate::agentic::json_envelope::{extract_json_object, EnvelopeExt};
use crate::agentic::{complete_with_timeout, CompletionRequest, LlmClient};
use crate::config::DispatchConfig;
use crate::error::DecisionFailure;
use crate::tools::{HistoryMessage, HistoryRole};

use super::followup::pending_followup;
use super::heuristics::{matches_allow_list, unclear_reason, ALLOW_LIST_CONFIDENCE};
use super::{AssessmentSource, ClarityAssessment, ReasonCode};

/// Confidence reported when the model step fails open
pub const FAIL_OPEN_CONFIDENCE: f32 = 0.5;

/// History entries included in the model prompt
const PROMPT_HISTORY: usize = 4;

const SYSTEM_PROMPT: &str = r#"You judge whether a request to a data assistant is specific enough to act on.
The assistant can query data, generate Excel reports, and email results.

Respond with a JSON object:
{"is_clear": true|false, "confidence": 0.0-1.0, "reason": "<short_snake_case_reason>" or null, "missing_info": ["..."], "possible_intents": ["..."]}

"confidence" is how confident you are that the request is clear and actionable.
"possible_intents" lists up to 4 short rephrasings the user might have meant."#;

#[derive(Debug, Clone)]
struct GateSettings {
    min_words: usize,
    threshold: f32,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl From<&DispatchConfig> for GateSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            min_words: config.min_words,
            threshold: config.clarity_threshold,
            temperature: config.clarity_temperature,
            max_tokens: config.max_tokens,
            timeout: config.llm_timeout(),
        }
    }
}

pub struct ClarityGate {
    client: Option<Arc<dyn LlmClient>>,
    settings: GateSettings,
}

impl ClarityGate {
    pub fn new(client: Arc<dyn LlmClient>, config: &DispatchConfig) -> Self {
        Self {
            client: Some(client),
            settings: config.into(),
        }
    }

    /// Gate with no model; undecided utterances fail open
    pub fn heuristic_only(config: &DispatchConfig) -> Self {
        Self {
            client: None,
            settings: config.into(),
        }
    }

    /// Assess an utterance given the recent session history (oldest first)
    pub async fn assess(&self, utterance: &str, history: &[HistoryMessage]) -> ClarityAssessment {
        if let Some(assessment) = self.assess_deterministic(utterance, history) {
            tracing::debug!(
                is_clear = assessment.is_clear,
                reason = assessment.reason.as_ref().map(|r| r.as_str()),
                source = ?assessment.source,
                "Clarity decided without model"
            );
            return assessment;
        }

        match self.assess_with_model(utterance, history).await {
            Ok(assessment) => assessment,
            Err(failure) => {
                tracing::warn!(error = %failure, "Clarity model unavailable, failing open");
                ClarityAssessment::clear(FAIL_OPEN_CONFIDENCE, AssessmentSource::FailOpen)
            }
        }
    }

    /// Steps 1-4; `None` means no rule concluded and the model must decide
    pub fn assess_deterministic(
        &self,
        utterance: &str,
        history: &[HistoryMessage],
    ) -> Option<ClarityAssessment> {
        if utterance.trim().is_empty() {
            return Some(ClarityAssessment::unclear(
                ReasonCode::Empty,
                0.0,
                AssessmentSource::Heuristic,
            ));
        }

        if let Some(follow_up) = pending_followup(history) {
            return Some(ClarityAssessment::follow_up(
                follow_up.combined_with(utterance),
            ));
        }

        if matches_allow_list(utterance) {
            return Some(ClarityAssessment::clear(
                ALLOW_LIST_CONFIDENCE,
                AssessmentSource::AllowList,
            ));
        }

        unclear_reason(utterance, self.settings.min_words).map(|(reason, confidence)| {
            ClarityAssessment::unclear(reason, confidence, AssessmentSource::Heuristic)
        })
    }

    /// Step 5 only, with every failure made explicit
    pub async fn assess_with_model(
        &self,
        utterance: &str,
        history: &[HistoryMessage],
    ) -> Result<ClarityAssessment, DecisionFailure> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| DecisionFailure::Provider("no LLM client configured".to_string()))?;

        let request = CompletionRequest::new(Self::build_prompt(utterance, history))
            .with_system(SYSTEM_PROMPT)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
            .json();

        let response = complete_with_timeout(client, &request, self.settings.timeout).await?;
        Self::parse_model_response(&response, self.settings.threshold)
    }

    fn build_prompt(utterance: &str, history: &[HistoryMessage]) -> String {
        let mut prompt = String::new();
        let skip = history.len().saturating_sub(PROMPT_HISTORY);
        if skip < history.len() {
            prompt.push_str("Recent conversation:\n");
            for message in &history[skip..] {
                let speaker = match message.role {
                    HistoryRole::User => "User",
                    HistoryRole::Assistant => "Assistant",
                };
                prompt.push_str(&format!("{}: {}\n", speaker, message.content.trim()));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!("Request: {}", utterance.trim()));
        prompt
    }

    fn parse_model_response(
        response: &str,
        threshold: f32,
    ) -> Result<ClarityAssessment, DecisionFailure> {
        let envelope = extract_json_object(response)?;

        let model_clear = envelope.require_bool("is_clear")?;
        let confidence = envelope
            .opt_f32("confidence")
            .ok_or(DecisionFailure::MissingField("confidence"))?
            .clamp(0.0, 1.0);

        let is_clear = model_clear && confidence >= threshold;
        let mut assessment = if is_clear {
            ClarityAssessment::clear(confidence, AssessmentSource::Model)
        } else {
            let reason = envelope
                .opt_str("reason")
                .unwrap_or_else(|| "low_confidence".to_string());
            ClarityAssessment::unclear(ReasonCode::Model(reason), confidence, AssessmentSource::Model)
        };
        assessment.missing_info = envelope.str_list("missing_info");
        assessment.possible_intents = envelope.str_list("possible_intents");
        Ok(assessment)
    }
}
