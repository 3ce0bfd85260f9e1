//! Pending Action Store
//!
//! Side-effecting proposals wait here for an explicit yes/no from the user.
//!
//! ```text
//! PENDING ──approve──> APPROVED ──mark_executed──> EXECUTED | FAILED
//!    │
//!    ├──reject──> REJECTED
//!    └──ttl────> EXPIRED   (lazily on read, or by the sweeper)
//! ```
//!
//! Every transition is a conditional update on the current status, so the
//! first resolver wins and later attempts observe the winner's record.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;
pub mod store;
pub mod sweeper;

pub use memory::InMemoryPendingBackend;
#[cfg(feature = "database")]
pub use postgres::PostgresPendingBackend;
pub use store::{PendingActionBackend, PendingActionStore};
pub use sweeper::{spawn_expiry_sweeper, spawn_sweeper};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Executed,
    Failed,
}

impl ActionStatus {
    pub const ALL: [ActionStatus; 6] = [
        ActionStatus::Pending,
        ActionStatus::Approved,
        ActionStatus::Rejected,
        ActionStatus::Expired,
        ActionStatus::Executed,
        ActionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Approved => "approved",
            ActionStatus::Rejected => "rejected",
            ActionStatus::Expired => "expired",
            ActionStatus::Executed => "executed",
            ActionStatus::Failed => "failed",
        }
    }

    /// The only edges of the lifecycle
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        use ActionStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Expired)
                | (Approved, Executed)
                | (Approved, Failed)
        )
    }

    /// No further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Rejected
                | ActionStatus::Expired
                | ActionStatus::Executed
                | ActionStatus::Failed
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown action status: {}", s))
    }
}

/// Kinds of confirmation-gated operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    GrantAccess,
    RevokeAccess,
    RegisterUser,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::GrantAccess => "grant_access",
            ActionType::RevokeAccess => "revoke_access",
            ActionType::RegisterUser => "register_user",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grant_access" => Ok(ActionType::GrantAccess),
            "revoke_access" => Ok(ActionType::RevokeAccess),
            "register_user" => Ok(ActionType::RegisterUser),
            other => Err(format!("unknown action type: {}", other)),
        }
    }
}

/// Identifies a suspended multi-turn operation to resume after approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    pub thread_id: String,
    pub checkpoint_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: String,
    pub user_role: String,
    pub action_type: ActionType,
    pub tool_name: String,
    /// Opaque tool invocation payload
    pub params: serde_json::Value,
    pub confirmation_message: String,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set by approve, reject or expiry
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
    /// Set by mark_executed
    pub executed_at: Option<DateTime<Utc>>,
    pub resume: Option<ResumeToken>,
}

impl PendingAction {
    /// Past the TTL window; `ttl = 0` is due immediately
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Pending and past the TTL window, but not yet flipped to EXPIRED
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status == ActionStatus::Pending && self.is_past_expiry(now)
    }

    /// Time of the most recent status change
    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.executed_at
            .or(self.resolved_at)
            .unwrap_or(self.created_at)
    }

    /// Copy of this record moved to `status`
    pub(crate) fn transitioned(
        &self,
        status: ActionStatus,
        at: DateTime<Utc>,
        actor: Option<&str>,
        note: Option<&str>,
    ) -> PendingAction {
        let mut next = self.clone();
        next.status = status;
        match status {
            ActionStatus::Executed | ActionStatus::Failed => {
                next.executed_at = Some(at);
                if let Some(note) = note {
                    next.resolution_note = Some(note.to_string());
                }
            }
            _ => {
                next.resolved_at = Some(at);
                next.resolved_by = actor.map(str::to_string);
                next.resolution_note = note.map(str::to_string);
            }
        }
        next
    }
}

/// Creation request; `ttl = None` uses the store default
#[derive(Debug, Clone)]
pub struct NewPendingAction {
    pub session_id: String,
    pub user_id: String,
    pub user_role: String,
    pub action_type: ActionType,
    pub tool_name: String,
    pub params: serde_json::Value,
    pub confirmation_message: String,
    pub ttl: Option<chrono::Duration>,
    pub resume: Option<ResumeToken>,
}

impl NewPendingAction {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        action_type: ActionType,
        tool_name: impl Into<String>,
        params: serde_json::Value,
        confirmation_message: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            user_role: String::new(),
            action_type,
            tool_name: tool_name.into(),
            params,
            confirmation_message: confirmation_message.into(),
            ttl: None,
            resume: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.user_role = role.into();
        self
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_resume(mut self, token: ResumeToken) -> Self {
        self.resume = Some(token);
        self
    }
}

/// Filter for `list`; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingFilter {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<ActionStatus>,
}

impl PendingFilter {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ActionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn matches(&self, action: &PendingAction) -> bool {
        self.session_id
            .as_deref()
            .map_or(true, |s| s == action.session_id)
            && self.user_id.as_deref().map_or(true, |u| u == action.user_id)
            && self.status.map_or(true, |s| s == action.status)
    }
}

/// Outcome of approve / reject / mark_executed
///
/// None of these are errors; only backend I/O fails with `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The transition was applied; carries the new record
    Applied(PendingAction),
    /// Already resolved; carries the existing record, unchanged
    AlreadyResolved(PendingAction),
    /// TTL elapsed before resolution; carries the EXPIRED record
    Expired(PendingAction),
    /// The requested edge does not exist from the current status
    InvalidTransition(PendingAction),
    NotFound,
}

impl ResolveOutcome {
    pub fn action(&self) -> Option<&PendingAction> {
        match self {
            ResolveOutcome::Applied(a)
            | ResolveOutcome::AlreadyResolved(a)
            | ResolveOutcome::Expired(a)
            | ResolveOutcome::InvalidTransition(a) => Some(a),
            ResolveOutcome::NotFound => None,
        }
    }

    pub fn status(&self) -> Option<ActionStatus> {
        self.action().map(|a| a.status)
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ResolveOutcome::Applied(_))
    }
}
