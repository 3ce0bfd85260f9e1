//! Keyword surfaces shared by the heuristic classifier

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap());

static REPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(report|reports|excel|spreadsheet|xlsx|xls|workbook|export)\b").unwrap()
});

static NOTIFY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(email|e-mail|emailed|mail|send|sent|notify|message|forward)\b")
        .unwrap()
});

/// First email address in the text, trailing punctuation excluded
pub fn extract_email(text: &str) -> Option<String> {
    EMAIL_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

pub fn mentions_report(text: &str) -> bool {
    REPORT_RE.is_match(text)
}

pub fn mentions_notify(text: &str) -> bool {
    NOTIFY_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_email() {
        assert_eq!(
            extract_email("email it to ops@example.com."),
            Some("ops@example.com".to_string())
        );
        assert_eq!(extract_email("no address here"), None);
    }

    #[test]
    fn test_keyword_sets() {
        assert!(mentions_report("generate an Excel file"));
        assert!(!mentions_report("reporter names"));
        assert!(mentions_notify("please send me the list"));
        assert!(!mentions_notify("show the sender column"));
    }
}
