//! Answer text for each turn outcome

use serde_json::Value;

use crate::tools::QueryOutput;

use super::state::{StageResult, TurnState};

/// Rows included when a notify body is built from query rows
pub const MAX_BODY_ROWS: usize = 50;

const EMPTY_ANSWER: &str = "I wasn't able to produce an answer for that request.";

pub fn non_empty_answer(answer: String) -> String {
    if answer.trim().is_empty() {
        EMPTY_ANSWER.to_string()
    } else {
        answer
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Tab-separated rows, header taken from the first row's keys
fn render_rows(rows: &[Value]) -> String {
    let header: Vec<String> = match rows.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let mut lines = Vec::with_capacity(rows.len().min(MAX_BODY_ROWS) + 1);
    if !header.is_empty() {
        lines.push(header.join("\t"));
    }
    for row in rows.iter().take(MAX_BODY_ROWS) {
        let line = match row {
            Value::Object(map) if !header.is_empty() => header
                .iter()
                .map(|key| map.get(key).map(cell).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("\t"),
            Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join("\t"),
            other => cell(other),
        };
        lines.push(line);
    }
    if rows.len() > MAX_BODY_ROWS {
        lines.push(format!("... and {} more rows", rows.len() - MAX_BODY_ROWS));
    }
    lines.join("\n")
}

/// Self-contained message body when no report file is attached
pub fn synthesize_body(query: Option<&StageResult<QueryOutput>>) -> String {
    match query {
        Some(Ok(output)) if !output.rows.is_empty() => {
            let mut body = String::new();
            if !output.answer.trim().is_empty() {
                body.push_str(output.answer.trim());
                body.push_str("\n\n");
            }
            body.push_str(&render_rows(&output.rows));
            body
        }
        Some(Ok(output)) if !output.answer.trim().is_empty() => output.answer.trim().to_string(),
        Some(Ok(_)) => "The query returned no rows.".to_string(),
        Some(Err(e)) => format!("The query could not be completed: {}", e),
        None => "No data was retrieved for this request.".to_string(),
    }
}

/// Subject line for outgoing notifications
pub fn notify_subject(utterance: &str) -> String {
    const MAX: usize = 60;
    let trimmed = utterance.trim();
    if trimmed.chars().count() <= MAX {
        format!("Results: {}", trimmed)
    } else {
        let head: String = trimmed.chars().take(MAX).collect();
        format!("Results: {}...", head.trim_end())
    }
}

/// Concatenate stage outcomes in stage order and settle the success flag
pub fn format_response(state: &mut TurnState) {
    let mut parts = Vec::new();

    match &state.query {
        Some(Ok(output)) if !output.answer.trim().is_empty() => {
            parts.push(output.answer.trim().to_string())
        }
        Some(Ok(output)) => parts.push(format!("The query returned {} rows.", output.row_count)),
        Some(Err(e)) => parts.push(format!("I couldn't run the query: {}", e)),
        None => {}
    }

    match &state.report {
        Some(Ok(report)) => parts.push(format!(
            "Your {} report is ready: {} ({} rows).",
            report.format.as_str(),
            report.report_path,
            report.rows_count
        )),
        Some(Err(e)) => parts.push(format!("The report could not be generated: {}", e)),
        None => {}
    }

    match &state.notify {
        Some(Ok(outcome)) => parts.push(format!("Sent to {}.", outcome.recipient)),
        Some(Err(e)) => parts.push(format!("The message could not be sent: {}", e)),
        None => {}
    }

    state.success = state.any_stage_succeeded();
    let errors = state.stage_errors();
    state.error = (!errors.is_empty()).then(|| errors.join("; "));
    state.answer = non_empty_answer(parts.join("\n\n"));
}
