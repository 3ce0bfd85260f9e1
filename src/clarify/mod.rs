//! Clarity gate
//!
//! Decides whether an utterance is actionable. Deterministic rules run first
//! and short-circuit; the model is only consulted when no rule concludes, and
//! any model failure is fail-open.

pub mod followup;
pub mod gate;
pub mod heuristics;
pub mod question;

pub use followup::{combine_clarification, looks_like_clarification, pending_followup, FollowUp};
pub use gate::ClarityGate;
pub use question::{ClarificationQuestion, QuestionGenerator, MAX_OPTIONS};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an utterance was judged unclear
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Empty,
    Greeting,
    TooShort,
    IncompleteSentence,
    AmbiguousReference,
    /// Free-form reason reported by the model
    Model(String),
}

impl ReasonCode {
    pub fn as_str(&self) -> &str {
        match self {
            ReasonCode::Empty => "empty",
            ReasonCode::Greeting => "greeting",
            ReasonCode::TooShort => "too_short",
            ReasonCode::IncompleteSentence => "incomplete_sentence",
            ReasonCode::AmbiguousReference => "ambiguous_reference",
            ReasonCode::Model(reason) => reason,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which step of the gate produced the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentSource {
    /// Empty input or an unclear-pattern rule
    Heuristic,
    /// Action-verb allow-list fast path
    AllowList,
    /// Response to a previous clarification question
    FollowUp,
    Model,
    /// Model call failed; treated as clear
    FailOpen,
}

/// Verdict of the clarity gate; built fresh per call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarityAssessment {
    pub is_clear: bool,
    /// In [0, 1]
    pub confidence: f32,
    pub reason: Option<ReasonCode>,
    pub missing_info: Vec<String>,
    pub possible_intents: Vec<String>,
    /// Set when this utterance answered a clarification question
    pub combined_question: Option<String>,
    pub source: AssessmentSource,
}

impl ClarityAssessment {
    pub fn clear(confidence: f32, source: AssessmentSource) -> Self {
        Self {
            is_clear: true,
            confidence: confidence.clamp(0.0, 1.0),
            reason: None,
            missing_info: Vec::new(),
            possible_intents: Vec::new(),
            combined_question: None,
            source,
        }
    }

    pub fn unclear(reason: ReasonCode, confidence: f32, source: AssessmentSource) -> Self {
        Self {
            is_clear: false,
            confidence: confidence.clamp(0.0, 1.0),
            reason: Some(reason),
            missing_info: Vec::new(),
            possible_intents: Vec::new(),
            combined_question: None,
            source,
        }
    }

    pub fn follow_up(combined: String) -> Self {
        Self {
            combined_question: Some(combined),
            ..Self::clear(0.9, AssessmentSource::FollowUp)
        }
    }
}
