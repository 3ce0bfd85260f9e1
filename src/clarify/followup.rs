//! Clarification follow-ups
//!
//! When the previous assistant turn asked the user to clarify, the current
//! utterance is an answer to that question, not a fresh request. The original
//! question and every answer so far are folded into one combined string.

use crate::tools::HistoryMessage;

use super::heuristics::word_count;

/// Longest assistant message still treated as a question by the "?" heuristic
const MAX_QUESTION_WORDS: usize = 30;

const CLARIFICATION_PHRASES: &[&str] = &[
    "could you clarify",
    "can you clarify",
    "could you be more specific",
    "can you be more specific",
    "did you mean",
    "which one",
    "what do you mean",
    "please specify",
    "could you provide more",
    "could you tell me a bit more",
    "what would you like",
];

/// Result of walking the trailing clarification chain
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUp {
    /// User messages in the chain, oldest first (the original question leads)
    pub parts: Vec<String>,
    /// Clarification questions the assistant has asked in this chain
    pub attempts: u32,
}

impl FollowUp {
    /// Fold the chain plus the current response into the re-classification input
    pub fn combined_with(&self, response: &str) -> String {
        let prior = self
            .parts
            .iter()
            .skip(1)
            .fold(self.parts.first().cloned().unwrap_or_default(), |acc, part| {
                combine_clarification(&acc, part)
            });
        combine_clarification(&prior, response)
    }
}

/// Deterministic concatenation of an unclear utterance and its clarification
pub fn combine_clarification(original: &str, response: &str) -> String {
    let original = original
        .trim()
        .trim_end_matches(['?', '.', '!'])
        .trim_end();
    let response = response.trim();
    match (original.is_empty(), response.is_empty()) {
        (true, _) => response.to_string(),
        (false, true) => original.to_string(),
        (false, false) => format!("{} {}", original, response),
    }
}

/// Does this assistant message ask the user to clarify?
pub fn looks_like_clarification(message: &HistoryMessage) -> bool {
    if !message.is_assistant() {
        return false;
    }
    if message.is_clarification {
        return true;
    }
    let content = message.content.trim();
    let lowered = content.to_lowercase();
    if CLARIFICATION_PHRASES.iter().any(|p| lowered.contains(p)) {
        return true;
    }
    content.ends_with('?') && word_count(content) <= MAX_QUESTION_WORDS
}

/// Walk back over `[user, clarification]*` pairs at the tail of the history
fn walk_chain(history: &[HistoryMessage]) -> FollowUp {
    let mut parts = Vec::new();
    let mut attempts = 0u32;
    let mut idx = history.len();

    while idx > 0 && looks_like_clarification(&history[idx - 1]) {
        attempts += 1;
        idx -= 1;
        match idx.checked_sub(1).map(|i| &history[i]) {
            Some(prev) if !prev.is_assistant() => {
                parts.push(prev.content.clone());
                idx -= 1;
            }
            _ => break,
        }
    }

    parts.reverse();
    FollowUp { parts, attempts }
}

/// The clarification chain the current utterance answers, if any
pub fn pending_followup(history: &[HistoryMessage]) -> Option<FollowUp> {
    let chain = walk_chain(history);
    (!chain.parts.is_empty()).then_some(chain)
}

/// Clarification questions already asked for the current original question
pub fn prior_clarification_attempts(history: &[HistoryMessage]) -> u32 {
    walk_chain(history).attempts
}
