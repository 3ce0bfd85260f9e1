//! Confirmation reply detection
//!
//! Tokens match as whole words, case-insensitively, so "I know the answer"
//! carries no "no". An utterance matching both sets, or neither, is not a
//! confirmation reply and goes through the normal graph.

use once_cell::sync::Lazy;
use regex::Regex;

static CONFIRM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(yes|yeah|yep|confirm|confirmed|proceed|approve|approved|ok|okay|sure|go\s+ahead|do\s+it)\b",
    )
    .unwrap()
});

static REJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(no|nope|cancel|stop|abort|reject|don't|dont|do\s+not|never\s*mind)\b")
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationReply {
    Confirm,
    Reject,
}

pub fn detect_confirmation(utterance: &str) -> Option<ConfirmationReply> {
    match (CONFIRM_RE.is_match(utterance), REJECT_RE.is_match(utterance)) {
        (true, false) => Some(ConfirmationReply::Confirm),
        (false, true) => Some(ConfirmationReply::Reject),
        _ => None,
    }
}
