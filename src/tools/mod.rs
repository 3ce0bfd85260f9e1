//! External collaborator contracts
//!
//! The dispatcher never implements querying, reporting or messaging itself.
//! It calls into these traits and treats an `Err` from any of them as a
//! failed stage, never as a failed turn.

pub mod history;
pub mod http;

pub use history::{
    HistoryMessage, HistoryRole, InMemorySessionHistory, SessionHistory, DEFAULT_HISTORY_CAPACITY,
};
pub use http::HttpTools;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::intent::ReportFormat;
use crate::pending::PendingAction;

/// Envelope every tool adapter answers with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse<T> {
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T> ToolResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Query
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub role: String,
    pub utterance: String,
    pub user_id: String,
    pub history: Vec<HistoryMessage>,
    /// Execution timeout enforced by the query tool
    pub timeout_secs: u64,
    /// Row cap enforced by the query tool
    pub max_rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub answer: String,
    #[serde(default)]
    pub rows: Vec<serde_json::Value>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub tables_used: Vec<String>,
    #[serde(default, alias = "sql")]
    pub query_text: Option<String>,
}

#[async_trait]
pub trait QueryTool: Send + Sync {
    async fn run(&self, request: QueryRequest) -> anyhow::Result<ToolResponse<QueryOutput>>;
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub role: String,
    pub utterance: String,
    pub user_id: String,
    pub format: ReportFormat,
    /// Result of the query stage, so the report tool does not re-run it
    pub precomputed: Option<QueryOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOutput {
    pub report_path: String,
    pub format: ReportFormat,
    #[serde(default)]
    pub rows_count: usize,
}

#[async_trait]
pub trait ReportTool: Send + Sync {
    async fn run(&self, request: ReportRequest) -> anyhow::Result<ToolResponse<ReportOutput>>;
}

// ============================================================================
// Notify
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRequest {
    pub role: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment_path: Option<String>,
    pub user_id: String,
}

#[async_trait]
pub trait NotifyTool: Send + Sync {
    async fn run(&self, request: NotifyRequest)
        -> anyhow::Result<ToolResponse<serde_json::Value>>;
}

// ============================================================================
// Confirmation-gated actions and recipient lookup
// ============================================================================

/// Result of running an approved pending action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub message: String,
}

/// Runs the side effect behind an approved pending action
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &PendingAction) -> anyhow::Result<ExecutionReport>;
}

/// Resolves a user id to a deliverable address
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn address_for(&self, user_id: &str) -> anyhow::Result<Option<String>>;
}
