//! Tolerant JSON extraction from model output
//!
//! Models wrap JSON in fences (```json ... ```), prefix it with labels
//! ("JSON:", "Response:") or trail it with commentary. This module finds the
//! outermost object and validates field presence before anyone reads it.

use serde_json::{Map, Value};

use crate::error::DecisionFailure;

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json", "JSON", ...) on the opening fence line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Extract the outermost JSON object from a model response
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, DecisionFailure> {
    let stripped = strip_code_fences(text);

    let start = stripped
        .find('{')
        .ok_or_else(|| DecisionFailure::Unparseable(preview(text)))?;
    let end = stripped
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| DecisionFailure::Unparseable(preview(text)))?;

    match serde_json::from_str::<Value>(&stripped[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DecisionFailure::Unparseable(preview(text))),
        Err(e) => Err(DecisionFailure::Unparseable(format!("{}: {}", e, preview(text)))),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

/// Typed accessors over a parsed envelope
pub trait EnvelopeExt {
    fn require_bool(&self, field: &'static str) -> Result<bool, DecisionFailure>;
    fn opt_f32(&self, field: &str) -> Option<f32>;
    fn opt_str(&self, field: &str) -> Option<String>;
    fn str_list(&self, field: &str) -> Vec<String>;
}

impl EnvelopeExt for Map<String, Value> {
    fn require_bool(&self, field: &'static str) -> Result<bool, DecisionFailure> {
        match self.get(field) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
            Some(other) => Err(DecisionFailure::InvalidField {
                field,
                value: other.to_string(),
            }),
            None => Err(DecisionFailure::MissingField(field)),
        }
    }

    fn opt_f32(&self, field: &str) -> Option<f32> {
        match self.get(field)? {
            Value::Number(n) => n.as_f64().map(|f| f as f32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn opt_str(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) if !s.trim().is_empty() && !s.eq_ignore_ascii_case("null") => {
                Some(s.trim().to_string())
            }
            _ => None,
        }
    }

    fn str_list(&self, field: &str) -> Vec<String> {
        match self.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }
}
