//! Graph nodes and the edges between them

use crate::intent::Intent;

use super::state::TurnState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    AssessClarity,
    ReturnClarification,
    ClassifyIntent,
    ExecuteQuery,
    ExecuteReport,
    ExecuteNotify,
    FormatResponse,
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Node::AssessClarity => "assess_clarity",
            Node::ReturnClarification => "return_clarification",
            Node::ClassifyIntent => "classify_intent",
            Node::ExecuteQuery => "execute_query",
            Node::ExecuteReport => "execute_report",
            Node::ExecuteNotify => "execute_notify",
            Node::FormatResponse => "format_response",
        }
    }
}

/// Unclear only while the attempt count is within `max_attempts`
pub fn route_after_clarity(state: &TurnState, max_attempts: u32) -> Node {
    if state.needs_clarification && state.clarification_attempts <= max_attempts {
        Node::ReturnClarification
    } else {
        Node::ClassifyIntent
    }
}

/// Every intent needs query rows first
pub fn route_after_intent(state: &TurnState) -> Node {
    match &state.intent {
        Some(intent) if intent.intent.needs_query() => Node::ExecuteQuery,
        _ => Node::FormatResponse,
    }
}

pub fn route_after_query(state: &TurnState) -> Node {
    match state.intent.as_ref().map(|i| i.intent) {
        Some(Intent::Report) | Some(Intent::Combined) => Node::ExecuteReport,
        Some(Intent::Notify) if state.recipient().is_some() => Node::ExecuteNotify,
        _ => Node::FormatResponse,
    }
}

pub fn route_after_report(state: &TurnState) -> Node {
    if state.recipient().is_some() {
        Node::ExecuteNotify
    } else {
        Node::FormatResponse
    }
}
