//! Session history
//!
//! Read-only from the engine's point of view. The in-memory provider also
//! exposes `record_exchange` so drivers (REPL, tests) can keep the log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// One message in a session, oldest first when returned by `get_recent`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
    #[serde(default)]
    pub tools_used: Option<Vec<String>>,
    /// Set on assistant messages that asked the user to clarify
    #[serde(default)]
    pub is_clarification: bool,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            content: content.into(),
            tools_used: None,
            is_clarification: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Assistant,
            content: content.into(),
            tools_used: None,
            is_clarification: false,
        }
    }

    pub fn clarification(content: impl Into<String>) -> Self {
        Self {
            is_clarification: true,
            ..Self::assistant(content)
        }
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools_used = Some(tools);
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.role == HistoryRole::Assistant
    }
}

#[async_trait]
pub trait SessionHistory: Send + Sync {
    /// Most recent `limit` messages, oldest first
    async fn get_recent(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<HistoryMessage>>;
}

/// Messages kept per (session, user) unless configured otherwise
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

type SessionLog = VecDeque<HistoryMessage>;

/// Process-local history keyed by (session, user); each log keeps at most
/// `capacity` messages, dropping the oldest
#[derive(Clone)]
pub struct InMemorySessionHistory {
    sessions: Arc<RwLock<HashMap<(String, String), SessionLog>>>,
    capacity: usize,
}

impl Default for InMemorySessionHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl InMemorySessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    pub async fn record(&self, session_id: &str, user_id: &str, message: HistoryMessage) {
        self.append(session_id, user_id, [message]).await;
    }

    /// Record a user utterance followed by the assistant answer
    pub async fn record_exchange(
        &self,
        session_id: &str,
        user_id: &str,
        utterance: &str,
        answer: HistoryMessage,
    ) {
        self.append(session_id, user_id, [HistoryMessage::user(utterance), answer])
            .await;
    }

    async fn append<I>(&self, session_id: &str, user_id: &str, messages: I)
    where
        I: IntoIterator<Item = HistoryMessage>,
    {
        let mut sessions = self.sessions.write().await;
        let log = sessions
            .entry((session_id.to_string(), user_id.to_string()))
            .or_default();
        log.extend(messages);
        let excess = log.len().saturating_sub(self.capacity);
        log.drain(..excess);
    }
}

#[async_trait]
impl SessionHistory for InMemorySessionHistory {
    async fn get_recent(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<HistoryMessage>> {
        let sessions = self.sessions.read().await;
        let log = match sessions.get(&(session_id.to_string(), user_id.to_string())) {
            Some(log) => log,
            None => return Ok(Vec::new()),
        };
        let skip = log.len().saturating_sub(limit);
        Ok(log.iter().skip(skip).cloned().collect())
    }
}
