//! Clarification question generation
//!
//! The model phrases the question when it can. Empty and greeting inputs, and
//! every generator failure, use the fixed table in [`fallback_question`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agentic::json_envelope::{extract_json_object, EnvelopeExt};
use crate::agentic::{complete_with_timeout, CompletionRequest, LlmClient};
use crate::config::DispatchConfig;
use crate::error::DecisionFailure;

use super::{ClarityAssessment, ReasonCode};

/// Upper bound on selectable options
pub const MAX_OPTIONS: usize = 4;

const SYSTEM_PROMPT: &str = r#"You write one short clarifying question for a data assistant.
The user's request needs more detail before it can run.

Respond with a JSON object:
{"question": "<one question>", "options": ["<up to 4 short choices>"], "hint": "<optional example of a clearer request>" or null}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub question: String,
    /// 0 to [`MAX_OPTIONS`] entries, in display order
    pub options: Vec<String>,
    pub hint: Option<String>,
}

impl ClarificationQuestion {
    pub fn new(question: impl Into<String>, options: Vec<String>, hint: Option<String>) -> Self {
        let options = options
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .take(MAX_OPTIONS)
            .collect();
        Self {
            question: question.into(),
            options,
            hint: hint.filter(|h| !h.trim().is_empty()),
        }
    }

    /// Question text with numbered options and hint, as shown to the user
    pub fn render(&self) -> String {
        let mut out = self.question.clone();
        for (i, option) in self.options.iter().enumerate() {
            out.push_str(&format!("\n  {}. {}", i + 1, option));
        }
        if let Some(hint) = &self.hint {
            out.push_str(&format!("\n({})", hint));
        }
        out
    }
}

fn options(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Deterministic question for an assessment, indexed by reason code
pub fn fallback_question(assessment: &ClarityAssessment) -> ClarificationQuestion {
    let capabilities = options(&[
        "Query your data",
        "Generate an Excel report",
        "Send results by email",
    ]);

    match assessment.reason.as_ref() {
        Some(ReasonCode::Greeting) => ClarificationQuestion::new(
            "Hello! What would you like to do?",
            capabilities,
            Some("For example: \"show me the top 10 customers by revenue\"".to_string()),
        ),
        Some(ReasonCode::Empty) => ClarificationQuestion::new(
            "I didn't catch a request. What would you like to do?",
            capabilities,
            None,
        ),
        Some(ReasonCode::TooShort) => ClarificationQuestion::new(
            "Could you tell me a bit more about what you need?",
            options(&[
                "Show me a list",
                "Count the records",
                "Create a report",
            ]),
            Some("Include what data you want and any filters, such as a date range".to_string()),
        ),
        Some(ReasonCode::IncompleteSentence) => ClarificationQuestion::new(
            "It looks like your request was cut off. Could you finish it?",
            Vec::new(),
            None,
        ),
        Some(ReasonCode::AmbiguousReference) => ClarificationQuestion::new(
            "Which data are you referring to?",
            Vec::new(),
            Some("Name the table, report or records you mean".to_string()),
        ),
        Some(ReasonCode::Model(_)) | None => {
            let question = match assessment.missing_info.first() {
                Some(missing) => format!("Could you clarify the {}?", missing),
                None => "Could you be more specific about what you need?".to_string(),
            };
            ClarificationQuestion::new(question, assessment.possible_intents.clone(), None)
        }
    }
}

#[derive(Debug, Clone)]
struct QuestionSettings {
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

pub struct QuestionGenerator {
    client: Option<Arc<dyn LlmClient>>,
    settings: QuestionSettings,
}

impl QuestionGenerator {
    pub fn new(client: Arc<dyn LlmClient>, config: &DispatchConfig) -> Self {
        Self {
            client: Some(client),
            settings: Self::settings(config),
        }
    }

    pub fn fallback_only(config: &DispatchConfig) -> Self {
        Self {
            client: None,
            settings: Self::settings(config),
        }
    }

    fn settings(config: &DispatchConfig) -> QuestionSettings {
        QuestionSettings {
            temperature: config.question_temperature,
            max_tokens: config.max_tokens,
            timeout: config.llm_timeout(),
        }
    }

    /// Always produces a question; generator failures use the fallback table
    pub async fn generate(
        &self,
        utterance: &str,
        assessment: &ClarityAssessment,
    ) -> ClarificationQuestion {
        if matches!(
            assessment.reason,
            Some(ReasonCode::Empty) | Some(ReasonCode::Greeting)
        ) {
            return fallback_question(assessment);
        }

        match self.generate_with_model(utterance, assessment).await {
            Ok(question) => question,
            Err(failure) => {
                tracing::warn!(
                    error = %failure,
                    reason = assessment.reason.as_ref().map(|r| r.as_str()),
                    "Question generator unavailable, using fallback question"
                );
                fallback_question(assessment)
            }
        }
    }

    pub async fn generate_with_model(
        &self,
        utterance: &str,
        assessment: &ClarityAssessment,
    ) -> Result<ClarificationQuestion, DecisionFailure> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| DecisionFailure::Provider("no LLM client configured".to_string()))?;

        let mut prompt = format!("Request: {}\n", utterance.trim());
        if let Some(reason) = &assessment.reason {
            prompt.push_str(&format!("Why it is unclear: {}\n", reason));
        }
        if !assessment.missing_info.is_empty() {
            prompt.push_str(&format!("Missing: {}\n", assessment.missing_info.join(", ")));
        }
        if !assessment.possible_intents.is_empty() {
            prompt.push_str(&format!(
                "Possible meanings: {}\n",
                assessment.possible_intents.join("; ")
            ));
        }

        let request = CompletionRequest::new(prompt)
            .with_system(SYSTEM_PROMPT)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
            .json();

        let response = complete_with_timeout(client, &request, self.settings.timeout).await?;
        Self::parse_model_response(&response)
    }

    fn parse_model_response(response: &str) -> Result<ClarificationQuestion, DecisionFailure> {
        let envelope = extract_json_object(response)?;
        let question = envelope
            .opt_str("question")
            .ok_or(DecisionFailure::MissingField("question"))?;
        Ok(ClarificationQuestion::new(
            question,
            envelope.str_list("options"),
            envelope.opt_str("hint"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clarify::AssessmentSource;

    fn unclear(reason: ReasonCode) -> ClarityAssessment {
        ClarityAssessment::unclear(reason, 0.2, AssessmentSource::Heuristic)
    }

    #[test]
    fn test_options_are_capped() {
        let q = ClarificationQuestion::new(
            "Which?",
            options(&["a", "b", " ", "c", "d", "e", "f"]),
            Some("  ".into()),
        );
        assert_eq!(q.options, options(&["a", "b", "c", "d"]));
        assert!(q.hint.is_none());
    }

    #[test]
    fn test_greeting_fallback_has_options() {
        let q = fallback_question(&unclear(ReasonCode::Greeting));
        assert!(!q.question.is_empty());
        assert!(!q.options.is_empty());
    }

    #[test]
    fn test_every_reason_has_a_question() {
        for reason in [
            ReasonCode::Empty,
            ReasonCode::Greeting,
            ReasonCode::TooShort,
            ReasonCode::IncompleteSentence,
            ReasonCode::AmbiguousReference,
            ReasonCode::Model("vague".into()),
        ] {
            let q = fallback_question(&unclear(reason));
            assert!(!q.question.trim().is_empty());
            assert!(q.options.len() <= MAX_OPTIONS);
        }
    }

    #[test]
    fn test_model_reason_uses_hints() {
        let mut a = unclear(ReasonCode::Model("missing_scope".into()));
        a.missing_info = vec!["date range".into()];
        a.possible_intents = vec!["Orders this month".into(), "Orders this year".into()];
        let q = fallback_question(&a);
        assert_eq!(q.question, "Could you clarify the date range?");
        assert_eq!(q.options.len(), 2);
    }

    #[test]
    fn test_render_numbers_options() {
        let q = ClarificationQuestion::new("Which?", options(&["one", "two"]), None);
        assert_eq!(q.render(), "Which?\n  1. one\n  2. two");
    }

    #[test]
    fn test_parse_model_response() {
        let q = QuestionGenerator::parse_model_response(
            r#"Sure: {"question": "Which region?", "options": ["EMEA", "APAC"], "hint": null}"#,
        )
        .unwrap();
        assert_eq!(q.question, "Which region?");
        assert_eq!(q.options.len(), 2);
        assert!(QuestionGenerator::parse_model_response(r#"{"options": []}"#).is_err());
    }

    #[tokio::test]
    async fn test_generator_without_client_falls_back() {
        let generator = QuestionGenerator::fallback_only(&DispatchConfig::default());
        let q = generator
            .generate("orders", &unclear(ReasonCode::TooShort))
            .await;
        assert_eq!(q, fallback_question(&unclear(ReasonCode::TooShort)));
    }
}
