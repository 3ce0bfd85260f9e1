//! Turn state threaded through the graph

use crate::clarify::{ClarificationQuestion, ClarityAssessment};
use crate::intent::IntentClassification;
use crate::tools::{HistoryMessage, QueryOutput, ReportOutput};

use super::TurnRequest;

/// Per-stage outcome; `Err` carries the user-facing failure detail
pub type StageResult<T> = Result<T, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct NotifyOutcome {
    /// Resolved address the message went to
    pub recipient: String,
    pub detail: serde_json::Value,
}

/// Owned by the engine for one turn only
#[derive(Debug, Clone)]
pub struct TurnState {
    pub request: TurnRequest,
    pub history: Vec<HistoryMessage>,
    /// Raw utterance, or the combined question in a follow-up turn
    pub effective_utterance: String,

    pub clarity: Option<ClarityAssessment>,
    pub needs_clarification: bool,
    pub clarification_attempts: u32,
    pub clarification: Option<ClarificationQuestion>,

    /// Classification computed alongside the clarity gate
    pub cached_intent: Option<IntentClassification>,
    pub intent: Option<IntentClassification>,

    /// Append-only, in invocation order
    pub tools_used: Vec<String>,
    pub query: Option<StageResult<QueryOutput>>,
    pub report: Option<StageResult<ReportOutput>>,
    pub notify: Option<StageResult<NotifyOutcome>>,

    pub answer: String,
    pub success: bool,
    pub error: Option<String>,
}

impl TurnState {
    pub fn new(request: TurnRequest, history: Vec<HistoryMessage>) -> Self {
        Self {
            effective_utterance: request.utterance.trim().to_string(),
            request,
            history,
            clarity: None,
            needs_clarification: false,
            clarification_attempts: 0,
            clarification: None,
            cached_intent: None,
            intent: None,
            tools_used: Vec::new(),
            query: None,
            report: None,
            notify: None,
            answer: String::new(),
            success: false,
            error: None,
        }
    }

    pub fn record_tool(&mut self, name: &str) {
        self.tools_used.push(name.to_string());
    }

    pub fn has_tool_results(&self) -> bool {
        self.query.is_some() || self.report.is_some() || self.notify.is_some()
    }

    pub fn any_stage_succeeded(&self) -> bool {
        self.query.as_ref().is_some_and(|r| r.is_ok())
            || self.report.as_ref().is_some_and(|r| r.is_ok())
            || self.notify.as_ref().is_some_and(|r| r.is_ok())
    }

    /// Failure details of every stage that ran and failed, in stage order
    pub fn stage_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(Err(e)) = &self.query {
            errors.push(format!("query: {}", e));
        }
        if let Some(Err(e)) = &self.report {
            errors.push(format!("report: {}", e));
        }
        if let Some(Err(e)) = &self.notify {
            errors.push(format!("notify: {}", e));
        }
        errors
    }

    /// Query output when the query stage succeeded
    pub fn query_output(&self) -> Option<&QueryOutput> {
        self.query.as_ref().and_then(|r| r.as_ref().ok())
    }

    pub fn report_output(&self) -> Option<&ReportOutput> {
        self.report.as_ref().and_then(|r| r.as_ref().ok())
    }

    pub fn recipient(&self) -> Option<&str> {
        self.intent.as_ref().and_then(|i| i.recipient.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TurnState {
        TurnState::new(TurnRequest::new("s1", "u1", "analyst", "  show orders  "), Vec::new())
    }

    #[test]
    fn test_new_state_is_empty() {
        let s = state();
        assert_eq!(s.effective_utterance, "show orders");
        assert!(!s.has_tool_results());
        assert!(!s.any_stage_succeeded());
        assert!(s.stage_errors().is_empty());
    }

    #[test]
    fn test_partial_success() {
        let mut s = state();
        s.query = Some(Ok(QueryOutput::default()));
        s.report = Some(Err("disk full".into()));
        assert!(s.any_stage_succeeded());
        assert_eq!(s.stage_errors(), vec!["report: disk full".to_string()]);
        assert!(s.report_output().is_none());
        assert!(s.query_output().is_some());
    }
}
