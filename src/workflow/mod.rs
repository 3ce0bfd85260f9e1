//! Workflow Engine
//!
//! One conversational turn, start to finish:
//!
//! ```text
//! confirmation reply? ──> resolve pending action            (graph skipped)
//! action request?     ──> create pending action, prompt     (graph skipped)
//!
//! assess_clarity ──unclear──> return_clarification
//!       │clear
//!       v
//! classify_intent ──> execute_query ──> [execute_report] ──> [execute_notify] ──> format_response
//! ```

pub mod actions;
pub mod confirmation;
pub mod engine;
pub mod format;
pub mod routing;
pub mod state;

pub use actions::{detect_action_request, ActionRequest};
pub use confirmation::{detect_confirmation, ConfirmationReply};
pub use engine::{WorkflowEngine, WorkflowEngineBuilder};
pub use routing::Node;
pub use state::{NotifyOutcome, StageResult, TurnState};

use serde::{Deserialize, Serialize};

use crate::clarify::ClarificationQuestion;
use crate::intent::Intent;
use crate::pending::PendingAction;
use crate::tools::HistoryMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub user_id: String,
    pub role: String,
    pub utterance: String,
}

impl TurnRequest {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        role: impl Into<String>,
        utterance: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            role: role.into(),
            utterance: utterance.into(),
        }
    }
}

/// How the turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// Went through the tool chain
    Answered,
    /// Stopped at the clarity gate
    Clarification,
    /// Created a pending action and asked for confirmation
    ConfirmationPrompt,
    /// Approved or rejected an existing pending action
    ConfirmationResolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub kind: TurnKind,
    /// Never empty
    pub answer: String,
    pub success: bool,
    pub tools_used: Vec<String>,
    pub intent: Option<Intent>,
    pub clarification: Option<ClarificationQuestion>,
    pub pending_action: Option<PendingAction>,
    pub error: Option<String>,
}

impl TurnResponse {
    pub(crate) fn new(kind: TurnKind, answer: String, success: bool) -> Self {
        Self {
            kind,
            answer: format::non_empty_answer(answer),
            success,
            tools_used: Vec::new(),
            intent: None,
            clarification: None,
            pending_action: None,
            error: None,
        }
    }

    /// The assistant message to append to session history for this turn
    pub fn history_entry(&self) -> HistoryMessage {
        let message = match self.kind {
            TurnKind::Clarification => HistoryMessage::clarification(self.answer.clone()),
            _ => HistoryMessage::assistant(self.answer.clone()),
        };
        if self.tools_used.is_empty() {
            message
        } else {
            message.with_tools(self.tools_used.clone())
        }
    }
}
