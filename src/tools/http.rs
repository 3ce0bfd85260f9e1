//! HTTP tool adapters
//!
//! Posts each collaborator request as JSON to `{base_url}/{tool}` and decodes
//! the `{success, result, error}` envelope. Transport failures surface as
//! `Err` and become failed stages in the engine.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::pending::PendingAction;

use super::{
    ActionExecutor, ExecutionReport, NotifyRequest, NotifyTool, QueryOutput, QueryRequest,
    QueryTool, ReportOutput, ReportRequest, ReportTool, ToolResponse,
};

/// Query/report/notify adapters and the action executor, backed by one HTTP service
#[derive(Clone)]
pub struct HttpTools {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTools {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self, tool: &str) -> String {
        format!("{}/{}", self.base_url, tool)
    }

    async fn post<Req, Res>(
        &self,
        tool: &str,
        body: &Req,
        timeout: Option<Duration>,
    ) -> Result<ToolResponse<Res>>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let mut request = self.client.post(self.endpoint(tool)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("{} tool unreachable", tool))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} tool error {}: {}", tool, status, body));
        }

        response
            .json::<ToolResponse<Res>>()
            .await
            .with_context(|| format!("{} tool returned an invalid envelope", tool))
    }
}

#[async_trait]
impl QueryTool for HttpTools {
    async fn run(&self, request: QueryRequest) -> Result<ToolResponse<QueryOutput>> {
        // Grace period on top of the tool-enforced execution timeout
        let timeout = Duration::from_secs(request.timeout_secs + 5);
        self.post("query", &request, Some(timeout)).await
    }
}

#[async_trait]
impl ReportTool for HttpTools {
    async fn run(&self, request: ReportRequest) -> Result<ToolResponse<ReportOutput>> {
        self.post("report", &request, None).await
    }
}

#[async_trait]
impl NotifyTool for HttpTools {
    async fn run(&self, request: NotifyRequest) -> Result<ToolResponse<serde_json::Value>> {
        self.post("notify", &request, None).await
    }
}

/// Approved actions are posted to `{base_url}/actions/{tool_name}`
#[async_trait]
impl ActionExecutor for HttpTools {
    async fn execute(&self, action: &PendingAction) -> Result<ExecutionReport> {
        let body = serde_json::json!({
            "action_id": action.id,
            "user_id": action.user_id,
            "role": action.user_role,
            "params": action.params,
        });
        let tool = format!("actions/{}", action.tool_name);
        let response: ToolResponse<serde_json::Value> = self.post(&tool, &body, None).await?;
        let message = match (&response.error, &response.result) {
            (Some(error), _) => error.clone(),
            (None, Some(serde_json::Value::String(message))) => message.clone(),
            (None, _) if response.success => format!("{} completed", action.tool_name),
            (None, _) => format!("{} failed", action.tool_name),
        };
        Ok(ExecutionReport {
            success: response.success,
            message,
        })
    }
}
