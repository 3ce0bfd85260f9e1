//! Deterministic clarity rules
//!
//! The allow-list is a fast path for obviously actionable requests; the
//! unclear checks run in a fixed order and the first match wins.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::ReasonCode;

/// Confidence returned by the allow-list fast path
pub const ALLOW_LIST_CONFIDENCE: f32 = 0.95;

/// Word count required for the allow-list fast path
pub const ALLOW_LIST_MIN_WORDS: usize = 5;

/// Content words (non-stopword, non-pronoun) the object must carry
const ALLOW_LIST_MIN_CONTENT: usize = 2;

static ACTION_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)^\s*
        (?:please\s+)?
        (?:(?:can|could|would|will)\s+you\s+(?:please\s+)?)?
        (show|list|count|generate|create|email|send|get|find|fetch|display|give|export|
         summarize|summarise|compare|calculate|how\s+many|what\s+(?:is|are|was|were))\b",
    )
    .unwrap()
});

static GREETING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(hi|hello|hey|hiya|howdy|yo|greetings|good\s+(?:morning|afternoon|evening|day)|thanks|thank\s+you)(?:\s+(?:there|all|team|bot|again))?[\s!.,?]*$",
    )
    .unwrap()
});

static UNCLEAR_PATTERNS: Lazy<Vec<(Regex, ReasonCode, f32)>> = Lazy::new(|| {
    vec![
        // Bare confirmations with nothing pending to confirm
        (
            Regex::new(
                r"(?i)^\s*(?:yes|no|ok|okay|sure|yep|nope|yeah|fine|maybe)(?:\s+(?:yes|no|ok|okay|sure|thanks|please|then|thing))*[\s!.]*$",
            )
            .unwrap(),
            ReasonCode::AmbiguousReference,
            0.15,
        ),
        // "what about X" / "how about X" fragments
        (
            Regex::new(r"(?i)^\s*(?:and\s+)?(?:what|how)\s+about\s+\S+(?:\s+\S+)?\s*\??\s*$")
                .unwrap(),
            ReasonCode::IncompleteSentence,
            0.3,
        ),
        // Dangling continuations
        (
            Regex::new(r"(?i)^\s*(?:and|but|also|same|again|more)(?:\s+\S+)?\s*[?.!]*\s*$").unwrap(),
            ReasonCode::IncompleteSentence,
            0.25,
        ),
    ]
});

static TRAILING_FUNCTION_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "to", "for", "with", "of", "in", "on", "at", "by", "from", "about", "into", "than",
        "between", "the", "a", "an", "and", "or", "but",
    ]
    .into_iter()
    .collect()
});

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "of", "to", "for", "in", "on", "at", "by", "with", "from", "about",
        "and", "or", "but", "is", "are", "was", "were", "be", "do", "does", "did", "can",
        "could", "would", "will", "should", "please", "me", "my", "i", "you", "your", "we",
        "us", "our", "show", "give", "get", "tell", "send", "make", "again", "more", "also",
        "just", "now", "what", "which", "how", "all", "some", "any",
    ]
    .into_iter()
    .collect()
});

static AMBIGUOUS_PRONOUNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "it", "this", "that", "these", "those", "them", "they", "he", "she", "him", "her",
        "one", "ones", "thing", "things", "stuff", "there", "here", "same",
    ]
    .into_iter()
    .collect()
});

/// Lowercased words with surrounding punctuation removed
pub fn normalized_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

pub fn word_count(text: &str) -> usize {
    normalized_words(text).len()
}

/// Explicit action verb followed by a substantive object
pub fn matches_allow_list(utterance: &str) -> bool {
    let Some(m) = ACTION_VERB_RE.find(utterance) else {
        return false;
    };
    if word_count(utterance) < ALLOW_LIST_MIN_WORDS {
        return false;
    }
    let object = &utterance[m.end()..];
    let content_words = normalized_words(object)
        .into_iter()
        .filter(|w| {
            !STOPWORDS.contains(w.as_str()) && !AMBIGUOUS_PRONOUNS.contains(w.as_str())
        })
        .count();
    content_words >= ALLOW_LIST_MIN_CONTENT
}

pub fn is_greeting(utterance: &str) -> bool {
    GREETING_RE.is_match(utterance)
}

pub fn ends_on_function_word(utterance: &str) -> bool {
    normalized_words(utterance)
        .last()
        .map(|w| TRAILING_FUNCTION_WORDS.contains(w.as_str()))
        .unwrap_or(false)
}

/// Only ambiguous pronouns remain once stopwords are removed
pub fn only_ambiguous_pronouns(utterance: &str) -> bool {
    let content: Vec<String> = normalized_words(utterance)
        .into_iter()
        .filter(|w| !STOPWORDS.contains(w.as_str()))
        .collect();
    !content.is_empty()
        && content
            .iter()
            .all(|w| AMBIGUOUS_PRONOUNS.contains(w.as_str()))
}

/// Run the unclear-pattern checks in order; first match wins
pub fn unclear_reason(utterance: &str, min_words: usize) -> Option<(ReasonCode, f32)> {
    if is_greeting(utterance) {
        return Some((ReasonCode::Greeting, 0.1));
    }
    if word_count(utterance) < min_words {
        return Some((ReasonCode::TooShort, 0.2));
    }
    if ends_on_function_word(utterance) {
        return Some((ReasonCode::IncompleteSentence, 0.2));
    }
    if only_ambiguous_pronouns(utterance) {
        return Some((ReasonCode::AmbiguousReference, 0.25));
    }
    UNCLEAR_PATTERNS
        .iter()
        .find(|(re, _, _)| re.is_match(utterance))
        .map(|(_, reason, confidence)| (reason.clone(), *confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_allow_list_examples() {
        assert!(matches_allow_list("show me the top 10 records"));
        assert!(matches_allow_list("Can you list all active customers in Germany"));
        assert!(matches_allow_list("how many orders shipped last week"));
        // Verb present but the object is all pronouns/stopwords
        assert!(!matches_allow_list("show me that one again please"));
        // Too few words
        assert!(!matches_allow_list("list customers"));
        // No leading verb
        assert!(!matches_allow_list("customers in Germany that are active"));
    }

    #[test]
    fn test_greeting() {
        assert!(is_greeting("hi"));
        assert!(is_greeting("Hello there!"));
        assert!(is_greeting("good morning"));
        assert!(!is_greeting("hi, show me the top customers"));
    }

    #[test]
    fn test_unclear_order() {
        assert_eq!(unclear_reason("hi", 3).unwrap().0, ReasonCode::Greeting);
        assert_eq!(unclear_reason("orders", 3).unwrap().0, ReasonCode::TooShort);
        assert_eq!(
            unclear_reason("show me the revenue for", 3).unwrap().0,
            ReasonCode::IncompleteSentence
        );
        assert_eq!(
            unclear_reason("can you do that again", 3).unwrap().0,
            ReasonCode::AmbiguousReference
        );
        assert_eq!(
            unclear_reason("what about Berlin office", 3).unwrap().0,
            ReasonCode::IncompleteSentence
        );
        assert!(unclear_reason("revenue per region during 2023", 3).is_none());
    }

    #[test]
    fn test_normalized_words_keeps_addresses() {
        assert_eq!(
            normalized_words("Email ops@example.com, please!"),
            vec!["email", "ops@example.com", "please"]
        );
    }

    fn content_noun() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "customers", "orders", "revenue", "invoices", "products", "region", "sales",
            "accounts", "shipments", "tickets", "quarterly", "active", "europe", "2024",
        ])
    }

    fn action_verb() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "show", "list", "count", "generate", "email", "find", "display", "export",
        ])
    }

    proptest! {
        #[test]
        fn prop_allow_list_with_object_is_clear(
            verb in action_verb(),
            nouns in prop::collection::vec(content_noun(), 3..8),
        ) {
            let utterance = format!("{} the {}", verb, nouns.join(" "));
            prop_assume!(word_count(&utterance) >= ALLOW_LIST_MIN_WORDS);
            prop_assert!(matches_allow_list(&utterance));
        }

        #[test]
        fn prop_short_non_greetings_are_too_short(words in prop::collection::vec("[a-z]{3,8}", 1..3)) {
            let utterance = words.join(" ");
            prop_assume!(!is_greeting(&utterance));
            let (reason, confidence) = unclear_reason(&utterance, 3).unwrap();
            prop_assert_eq!(reason, ReasonCode::TooShort);
            prop_assert!(confidence <= 0.3);
        }
    }
}
