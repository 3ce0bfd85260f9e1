//! Intent Classifier
//!
//! Classifies an utterance into query / report / notify / combined.
//!
//! The classifier uses a two-path approach:
//! 1. A single constrained LLM call returning a JSON envelope
//! 2. Deterministic keyword classification when the model is unavailable,
//!    times out, answers garbage, or is not confident enough
//!
//! `classify` takes `&self` only and holds no mutable state, so the engine can
//! run it concurrently with the clarity gate.

use std::sync::Arc;
use std::time::Duration;

use crate::agentic::json_envelope::{extract_json_object, EnvelopeExt};
use crate::agentic::{complete_with_timeout, CompletionRequest, LlmClient};
use crate::config::DispatchConfig;
use crate::error::DecisionFailure;

use super::keywords::{extract_email, mentions_notify, mentions_report};
use super::{ClassificationSource, Intent, IntentClassification, ReportFormat, SELF_RECIPIENT};

const SYSTEM_PROMPT: &str = r#"You route data-assistant requests.
Classify the request into exactly one intent:
- "query": the user wants to see or count data
- "report": the user wants a downloadable report/spreadsheet of the data
- "notify": the user wants data sent by email/message without a report file
- "combined": the user wants a report generated AND sent by email/message

Respond with a JSON object:
{"intent": "query|report|notify|combined", "report_format": "excel" or null, "recipient": "<email address>" or "self" or null, "confidence": 0.0-1.0}

Use "self" as recipient when the user asks to send something to themselves without giving an address."#;

#[derive(Debug, Clone)]
struct ClassifierSettings {
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    confidence_threshold: f32,
}

impl From<&DispatchConfig> for ClassifierSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            temperature: config.intent_temperature,
            max_tokens: config.max_tokens,
            timeout: config.llm_timeout(),
            confidence_threshold: config.intent_confidence_threshold,
        }
    }
}

/// The intent classifier
pub struct IntentClassifier {
    client: Option<Arc<dyn LlmClient>>,
    settings: ClassifierSettings,
}

impl IntentClassifier {
    /// Create a classifier backed by an LLM client
    pub fn new(client: Arc<dyn LlmClient>, config: &DispatchConfig) -> Self {
        Self {
            client: Some(client),
            settings: config.into(),
        }
    }

    /// Create a classifier that only uses keyword rules
    pub fn keywords_only(config: &DispatchConfig) -> Self {
        Self {
            client: None,
            settings: config.into(),
        }
    }

    /// Classify an utterance; model failures fall back to keywords
    pub async fn classify(&self, utterance: &str) -> IntentClassification {
        match self.classify_with_model(utterance).await {
            Ok(classification) => {
                tracing::debug!(intent = %classification.intent, "Intent classified by model");
                classification
            }
            Err(failure) => {
                let classification = Self::classify_by_keywords(utterance);
                tracing::warn!(
                    error = %failure,
                    intent = %classification.intent,
                    "Intent model unavailable, using keyword classification"
                );
                classification
            }
        }
    }

    /// The model path only, with every failure mode made explicit
    pub async fn classify_with_model(
        &self,
        utterance: &str,
    ) -> Result<IntentClassification, DecisionFailure> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| DecisionFailure::Provider("no LLM client configured".to_string()))?;

        let request = CompletionRequest::new(format!("Request: {}", utterance.trim()))
            .with_system(SYSTEM_PROMPT)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
            .json();

        let response = complete_with_timeout(client, &request, self.settings.timeout).await?;
        Self::parse_model_response(&response, utterance, self.settings.confidence_threshold)
    }

    /// Parse and validate the model envelope
    fn parse_model_response(
        response: &str,
        utterance: &str,
        confidence_threshold: f32,
    ) -> Result<IntentClassification, DecisionFailure> {
        let envelope = extract_json_object(response)?;

        let label = envelope
            .opt_str("intent")
            .ok_or(DecisionFailure::MissingField("intent"))?;
        let intent = label
            .parse::<Intent>()
            .map_err(|_| DecisionFailure::InvalidField {
                field: "intent",
                value: label.clone(),
            })?;

        if let Some(confidence) = envelope.opt_f32("confidence") {
            if confidence < confidence_threshold {
                return Err(DecisionFailure::LowConfidence(confidence));
            }
        }

        let report_format = if intent.wants_report() {
            Some(
                envelope
                    .opt_str("report_format")
                    .and_then(|f| ReportFormat::parse_lenient(&f))
                    .unwrap_or_default(),
            )
        } else {
            None
        };

        let recipient = if intent.wants_notify() {
            let from_model = envelope.opt_str("recipient").map(|r| {
                if matches!(r.to_lowercase().as_str(), "self" | "me" | "myself" | "user") {
                    SELF_RECIPIENT.to_string()
                } else {
                    r
                }
            });
            Some(
                from_model
                    .or_else(|| extract_email(utterance))
                    .unwrap_or_else(|| SELF_RECIPIENT.to_string()),
            )
        } else {
            None
        };

        Ok(IntentClassification {
            intent,
            report_format,
            recipient,
            source: ClassificationSource::Model,
        })
    }

    /// Deterministic keyword classification
    pub fn classify_by_keywords(utterance: &str) -> IntentClassification {
        let email = extract_email(utterance);
        let wants_report = mentions_report(utterance);
        let wants_notify = email.is_some() || mentions_notify(utterance);

        let intent = match (wants_report, wants_notify) {
            (true, true) => Intent::Combined,
            (true, false) => Intent::Report,
            (false, true) => Intent::Notify,
            (false, false) => Intent::Query,
        };

        IntentClassification {
            intent,
            report_format: wants_report.then_some(ReportFormat::Excel),
            recipient: wants_notify
                .then(|| email.unwrap_or_else(|| SELF_RECIPIENT.to_string())),
            source: ClassificationSource::Keywords,
        }
    }
}
