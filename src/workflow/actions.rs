//! Action-request detection
//!
//! A narrow keyword surface for side-effecting requests (grant, revoke,
//! register). A match never runs anything; it becomes a pending action that
//! the user must confirm on a later turn.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::pending::ActionType;

static GRANT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:grant|give)\s+(?P<user>[\w.@+-]+)\s+(?:(?P<level>read|write|admin|read-only|full)\s+)?access\s+(?:to|on)\s+(?:the\s+)?(?P<target>[\w.-]+(?:[ \t]+[\w.-]+)*)",
    )
    .unwrap()
});

static REVOKE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:revoke|remove)\s+(?P<user>[\w.@+-]+?)(?:'s)?\s+access\s+(?:to|from|on)\s+(?:the\s+)?(?P<target>[\w.-]+(?:[ \t]+[\w.-]+)*)",
    )
    .unwrap()
});

static REGISTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:register|add|create)\s+(?:a\s+)?(?:new\s+)?user\s+(?P<user>[\w.@+-]+)(?:\s+(?:as|with\s+role)\s+(?:an?\s+)?(?P<role>\w+))?",
    )
    .unwrap()
});

/// Words that open a trailing clause after the target noun phrase
static TARGET_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[ \t]+(?:and|but|for|so|because|until|now|then|please|today|asap|thanks)\b")
        .unwrap()
});

/// "sales db and notify me" -> "sales db"
fn target_phrase(raw: &str) -> &str {
    let phrase = match TARGET_END_RE.find(raw) {
        Some(m) => &raw[..m.start()],
        None => raw,
    };
    phrase.trim_end_matches('.')
}

/// A detected side-effecting request, ready to become a pending action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action_type: ActionType,
    pub tool_name: String,
    pub params: serde_json::Value,
    pub confirmation_message: String,
}

const CONFIRM_SUFFIX: &str = "Reply 'yes' to confirm or 'no' to cancel.";

/// "me" / "myself" refer to the requester
fn subject<'a>(user: &'a str, requester: &'a str) -> &'a str {
    match user.to_lowercase().as_str() {
        "me" | "myself" => requester,
        _ => user,
    }
}

pub fn detect_action_request(utterance: &str, requester: &str) -> Option<ActionRequest> {
    if let Some(caps) = GRANT_RE.captures(utterance) {
        let user = subject(&caps["user"], requester);
        let target = target_phrase(&caps["target"]);
        let level = caps
            .name("level")
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_else(|| "read".to_string());
        return Some(ActionRequest {
            action_type: ActionType::GrantAccess,
            tool_name: ActionType::GrantAccess.as_str().to_string(),
            params: json!({ "user": user, "target": target, "level": level }),
            confirmation_message: format!(
                "I'm about to grant {} {} access to {}. {}",
                user, level, target, CONFIRM_SUFFIX
            ),
        });
    }

    if let Some(caps) = REVOKE_RE.captures(utterance) {
        let user = subject(&caps["user"], requester);
        let target = target_phrase(&caps["target"]);
        return Some(ActionRequest {
            action_type: ActionType::RevokeAccess,
            tool_name: ActionType::RevokeAccess.as_str().to_string(),
            params: json!({ "user": user, "target": target }),
            confirmation_message: format!(
                "I'm about to revoke {}'s access to {}. {}",
                user, target, CONFIRM_SUFFIX
            ),
        });
    }

    if let Some(caps) = REGISTER_RE.captures(utterance) {
        let user = &caps["user"];
        let role = caps
            .name("role")
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_else(|| "viewer".to_string());
        return Some(ActionRequest {
            action_type: ActionType::RegisterUser,
            tool_name: ActionType::RegisterUser.as_str().to_string(),
            params: json!({ "user": user, "role": role }),
            confirmation_message: format!(
                "I'm about to register user {} with role {}. {}",
                user, role, CONFIRM_SUFFIX
            ),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant() {
        let req = detect_action_request("please grant alice write access to the sales db", "u1")
            .unwrap();
        assert_eq!(req.action_type, ActionType::GrantAccess);
        assert_eq!(req.params["user"], "alice");
        assert_eq!(req.params["level"], "write");
        assert_eq!(req.params["target"], "sales db");
        assert!(req
            .confirmation_message
            .starts_with("I'm about to grant alice write access to sales db."));
    }

    #[test]
    fn test_target_stops_at_clause_boundaries() {
        let cases = [
            ("grant alice read access to sales", "sales"),
            ("grant alice access to the finance warehouse, thanks", "finance warehouse"),
            ("give bob admin access to reporting db and let me know", "reporting db"),
            ("grant carol access to hr.payroll for the audit", "hr.payroll"),
            ("grant dave access to sales db.", "sales db"),
        ];
        for (utterance, target) in cases {
            let req = detect_action_request(utterance, "u1").unwrap();
            assert_eq!(req.params["target"], target, "{}", utterance);
        }

        let req = detect_action_request("revoke bob's access to the legacy crm now", "u1").unwrap();
        assert_eq!(req.params["target"], "legacy crm");
    }

    #[test]
    fn test_grant_to_self_defaults_to_read() {
        let req = detect_action_request("give me access to finance", "u42").unwrap();
        assert_eq!(req.params["user"], "u42");
        assert_eq!(req.params["level"], "read");
    }

    #[test]
    fn test_revoke() {
        let req = detect_action_request("Revoke bob's access to warehouse", "u1").unwrap();
        assert_eq!(req.action_type, ActionType::RevokeAccess);
        assert_eq!(req.params["user"], "bob");
        assert_eq!(req.params["target"], "warehouse");
    }

    #[test]
    fn test_register() {
        let req = detect_action_request("register a new user carol as an analyst", "u1").unwrap();
        assert_eq!(req.action_type, ActionType::RegisterUser);
        assert_eq!(req.params["role"], "analyst");
    }

    #[test]
    fn test_data_requests_are_not_actions() {
        assert!(detect_action_request("show me the top 10 records", "u1").is_none());
        assert!(detect_action_request("give me the revenue by region", "u1").is_none());
        assert!(detect_action_request("list users with access to sales", "u1").is_none());
    }
}
