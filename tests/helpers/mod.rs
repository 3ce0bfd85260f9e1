//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;

use turn_dispatch::tools::{
    ActionExecutor, ExecutionReport, HistoryMessage, NotifyRequest, NotifyTool, QueryOutput,
    QueryRequest, QueryTool, RecipientDirectory, ReportOutput, ReportRequest, ReportTool,
    SessionHistory, ToolResponse,
};
use turn_dispatch::{CompletionRequest, DispatchConfig, LlmClient, PendingAction, WorkflowEngine};

// =============================================================================
// SCRIPTED LLM
// =============================================================================

/// Markers that identify which decision step sent a prompt
pub const CLARITY: &str = "specific enough to act on";
pub const INTENT: &str = "You route data-assistant requests";
pub const QUESTION: &str = "clarifying question";

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Answers by system-prompt marker; unknown markers fail
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<HashMap<&'static str, Reply>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, marker: &'static str, reply: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(marker, Reply::Text(reply.to_string()));
        self
    }

    pub fn failing(self, marker: &'static str, error: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(marker, Reply::Fail(error.to_string()));
        self
    }

    pub fn delayed(self, marker: &'static str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(marker, delay);
        self
    }

    pub fn calls_to(&self, marker: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| **m == marker).count()
    }

    fn marker_for(request: &CompletionRequest) -> Option<&'static str> {
        let system = request.system.as_deref().unwrap_or_default();
        [CLARITY, INTENT, QUESTION]
            .into_iter()
            .find(|marker| system.contains(marker))
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let marker = Self::marker_for(request).ok_or_else(|| anyhow!("unrecognised prompt"))?;
        self.calls.lock().unwrap().push(marker);

        let delay = self.delays.lock().unwrap().get(marker).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().unwrap().get(marker).cloned();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("no scripted reply for {}", marker)),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &str {
        "test"
    }
}

// =============================================================================
// RECORDING TOOLS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Query { utterance: String, max_rows: usize },
    Report { has_precomputed: bool },
    Notify {
        recipient: String,
        body: String,
        attachment: Option<String>,
    },
    Execute { tool_name: String },
}

#[derive(Default)]
pub struct RecordingTools {
    pub calls: Mutex<Vec<ToolCall>>,
    pub query_error: Option<String>,
    pub report_error: Option<String>,
    pub execute_fails: bool,
}

impl RecordingTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryTool for RecordingTools {
    async fn run(&self, request: QueryRequest) -> Result<ToolResponse<QueryOutput>> {
        self.calls.lock().unwrap().push(ToolCall::Query {
            utterance: request.utterance.clone(),
            max_rows: request.max_rows,
        });
        if let Some(error) = &self.query_error {
            return Ok(ToolResponse::failed(error.clone()));
        }
        Ok(ToolResponse::ok(QueryOutput {
            answer: "Here are the top records.".into(),
            rows: vec![
                json!({"id": 1, "name": "Acme"}),
                json!({"id": 2, "name": "Globex"}),
            ],
            row_count: 2,
            tables_used: vec!["customers".into()],
            query_text: Some("SELECT id, name FROM customers LIMIT 10".into()),
        }))
    }
}

#[async_trait]
impl ReportTool for RecordingTools {
    async fn run(&self, request: ReportRequest) -> Result<ToolResponse<ReportOutput>> {
        self.calls.lock().unwrap().push(ToolCall::Report {
            has_precomputed: request.precomputed.is_some(),
        });
        if let Some(error) = &self.report_error {
            return Err(anyhow!(error.clone()));
        }
        let rows_count = request.precomputed.map(|q| q.row_count).unwrap_or_default();
        Ok(ToolResponse::ok(ReportOutput {
            report_path: "/reports/result.xlsx".into(),
            format: request.format,
            rows_count,
        }))
    }
}

#[async_trait]
impl NotifyTool for RecordingTools {
    async fn run(&self, request: NotifyRequest) -> Result<ToolResponse<serde_json::Value>> {
        self.calls.lock().unwrap().push(ToolCall::Notify {
            recipient: request.recipient,
            body: request.body,
            attachment: request.attachment_path,
        });
        Ok(ToolResponse::ok(json!({"message_id": "m-1"})))
    }
}

#[async_trait]
impl ActionExecutor for RecordingTools {
    async fn execute(&self, action: &PendingAction) -> Result<ExecutionReport> {
        self.calls.lock().unwrap().push(ToolCall::Execute {
            tool_name: action.tool_name.clone(),
        });
        Ok(ExecutionReport {
            success: !self.execute_fails,
            message: if self.execute_fails {
                "permission service rejected the change".into()
            } else {
                format!("{} applied", action.tool_name)
            },
        })
    }
}

// =============================================================================
// HISTORY AND DIRECTORY
// =============================================================================

/// History provider that always fails
pub struct BrokenHistory;

#[async_trait]
impl SessionHistory for BrokenHistory {
    async fn get_recent(&self, _: &str, _: &str, _: usize) -> Result<Vec<HistoryMessage>> {
        Err(anyhow!("history store offline"))
    }
}

pub struct FixedDirectory(pub Option<&'static str>);

#[async_trait]
impl RecipientDirectory for FixedDirectory {
    async fn address_for(&self, _user_id: &str) -> Result<Option<String>> {
        Ok(self.0.map(str::to_string))
    }
}

// =============================================================================
// ENGINE WIRING
// =============================================================================

pub fn engine_with(
    config: DispatchConfig,
    tools: Arc<RecordingTools>,
    llm: Option<Arc<ScriptedLlm>>,
    history: Option<Arc<dyn SessionHistory>>,
) -> WorkflowEngine {
    let mut builder = WorkflowEngine::builder(config)
        .query_tool(tools.clone())
        .report_tool(tools.clone())
        .notify_tool(tools.clone())
        .action_executor(tools)
        .recipients(Arc::new(FixedDirectory(Some("me@example.com"))));
    if let Some(llm) = llm {
        builder = builder.llm(llm);
    }
    if let Some(history) = history {
        builder = builder.history(history);
    }
    builder.build().expect("engine builds")
}
