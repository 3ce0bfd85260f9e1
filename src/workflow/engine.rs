//! Workflow Engine
//!
//! Runs one turn: the confirmation and action-request bypasses, then the
//! clarity → intent → query → report → notify graph.
//!
//! `handle_turn` never fails. Decision steps fall back, tool stages record
//! their failure on the turn state, and every exit carries a non-empty answer.

use std::sync::Arc;
use tracing::Instrument;

use crate::agentic::LlmClient;
use crate::clarify::followup::prior_clarification_attempts;
use crate::clarify::{ClarityGate, QuestionGenerator};
use crate::config::DispatchConfig;
use crate::error::ConfigError;
use crate::intent::{IntentClassifier, SELF_RECIPIENT};
use crate::pending::{NewPendingAction, PendingAction, PendingActionStore, ResolveOutcome};
use crate::tools::{
    ActionExecutor, ExecutionReport, HistoryMessage, NotifyRequest, NotifyTool, QueryRequest,
    QueryTool, RecipientDirectory, ReportRequest, ReportTool, SessionHistory, ToolResponse,
};

use super::actions::{detect_action_request, ActionRequest};
use super::confirmation::{detect_confirmation, ConfirmationReply};
use super::format::{format_response, notify_subject, synthesize_body};
use super::routing::{
    route_after_clarity, route_after_intent, route_after_query, route_after_report, Node,
};
use super::state::{NotifyOutcome, StageResult, TurnState};
use super::{TurnKind, TurnRequest, TurnResponse};

/// Collapse a collaborator call into a stage result
fn settle<T>(stage: &str, outcome: anyhow::Result<ToolResponse<T>>) -> StageResult<Option<T>> {
    match outcome {
        Ok(response) if response.success => Ok(response.result),
        Ok(response) => {
            let error = response
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| format!("{} tool reported failure", stage));
            tracing::warn!(stage, error = %error, "Tool stage failed");
            Err(error)
        }
        Err(e) => {
            tracing::warn!(stage, error = %e, "Tool call failed");
            Err(e.to_string())
        }
    }
}

pub struct WorkflowEngine {
    config: DispatchConfig,
    gate: ClarityGate,
    classifier: IntentClassifier,
    questions: QuestionGenerator,
    query_tool: Arc<dyn QueryTool>,
    report_tool: Arc<dyn ReportTool>,
    notify_tool: Arc<dyn NotifyTool>,
    history: Option<Arc<dyn SessionHistory>>,
    pending: PendingActionStore,
    executor: Option<Arc<dyn ActionExecutor>>,
    recipients: Option<Arc<dyn RecipientDirectory>>,
}

impl WorkflowEngine {
    pub fn builder(config: DispatchConfig) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new(config)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn pending_store(&self) -> &PendingActionStore {
        &self.pending
    }

    /// Process one utterance end to end
    pub async fn handle_turn(&self, request: TurnRequest) -> TurnResponse {
        let span = tracing::info_span!(
            "turn",
            session_id = %request.session_id,
            user_id = %request.user_id
        );
        self.dispatch(request).instrument(span).await
    }

    async fn dispatch(&self, request: TurnRequest) -> TurnResponse {
        if let Some(reply) = detect_confirmation(&request.utterance) {
            if let Some(action) = self.latest_pending(&request.session_id).await {
                tracing::info!(action_id = %action.id, reply = ?reply, "Routing to confirmation resolver");
                return self.resolve_confirmation(&request, action, reply).await;
            }
        }

        if let Some(action_request) = detect_action_request(&request.utterance, &request.user_id) {
            tracing::info!(action_type = %action_request.action_type, "Routing to action proposal");
            return self.propose_action(&request, action_request).await;
        }

        let history = self.recent_history(&request).await;
        let mut state = TurnState::new(request, history);
        self.run_graph(&mut state).await;
        Self::into_response(state)
    }

    // ========================================================================
    // Bypass paths
    // ========================================================================

    async fn latest_pending(&self, session_id: &str) -> Option<PendingAction> {
        match self.pending.latest_unresolved(session_id).await {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(error = %e, "Pending action lookup failed, ignoring confirmation");
                None
            }
        }
    }

    async fn propose_action(&self, request: &TurnRequest, proposal: ActionRequest) -> TurnResponse {
        let new = NewPendingAction::new(
            request.session_id.clone(),
            request.user_id.clone(),
            proposal.action_type,
            proposal.tool_name,
            proposal.params,
            proposal.confirmation_message,
        )
        .with_role(request.role.clone())
        .with_ttl(self.config.pending_ttl());

        match self.pending.create(new).await {
            Ok(action) => {
                let mut response = TurnResponse::new(
                    TurnKind::ConfirmationPrompt,
                    action.confirmation_message.clone(),
                    true,
                );
                response.pending_action = Some(action);
                response
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to record pending action");
                let mut response = TurnResponse::new(
                    TurnKind::Answered,
                    "I couldn't set up that request for confirmation. Please try again.".into(),
                    false,
                );
                response.error = Some(e.to_string());
                response
            }
        }
    }

    async fn resolve_confirmation(
        &self,
        request: &TurnRequest,
        action: PendingAction,
        reply: ConfirmationReply,
    ) -> TurnResponse {
        let outcome = match reply {
            ConfirmationReply::Confirm => {
                self.pending.approve(action.id, &request.user_id, None).await
            }
            ConfirmationReply::Reject => {
                self.pending
                    .reject(action.id, &request.user_id, Some("declined by user"))
                    .await
            }
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(action_id = %action.id, error = %e, "Failed to resolve pending action");
                let mut response = TurnResponse::new(
                    TurnKind::ConfirmationResolved,
                    "I couldn't update that request right now. Please try again.".into(),
                    false,
                );
                response.error = Some(e.to_string());
                response.pending_action = Some(action);
                return response;
            }
        };

        let (answer, success, record) = match (reply, outcome) {
            (ConfirmationReply::Confirm, ResolveOutcome::Applied(approved)) => {
                return self.execute_approved(approved).await;
            }
            (ConfirmationReply::Reject, ResolveOutcome::Applied(rejected)) => (
                "Cancelled. Nothing was changed.".to_string(),
                true,
                Some(rejected),
            ),
            (_, ResolveOutcome::Expired(expired)) => (
                "That request expired before it was confirmed. Please ask again.".to_string(),
                false,
                Some(expired),
            ),
            (_, ResolveOutcome::AlreadyResolved(existing)) => (
                format!("That request was already {}.", existing.status),
                true,
                Some(existing),
            ),
            (_, ResolveOutcome::InvalidTransition(current)) => (
                format!("That request can't be changed while it is {}.", current.status),
                false,
                Some(current),
            ),
            (_, ResolveOutcome::NotFound) => (
                "I couldn't find that request any more.".to_string(),
                false,
                None,
            ),
        };

        let mut response = TurnResponse::new(TurnKind::ConfirmationResolved, answer, success);
        response.pending_action = record.or(Some(action));
        response
    }

    /// Run an approved action and record EXECUTED or FAILED
    async fn execute_approved(&self, approved: PendingAction) -> TurnResponse {
        let report = match &self.executor {
            Some(executor) => match executor.execute(&approved).await {
                Ok(report) => report,
                Err(e) => ExecutionReport {
                    success: false,
                    message: e.to_string(),
                },
            },
            None => ExecutionReport {
                success: false,
                message: "no action executor is configured".to_string(),
            },
        };
        tracing::info!(
            action_id = %approved.id,
            success = report.success,
            "Approved action ran"
        );

        let recorded = match self
            .pending
            .mark_executed(approved.id, report.success, Some(&report.message))
            .await
        {
            Ok(outcome) => outcome.action().cloned(),
            Err(e) => {
                tracing::warn!(action_id = %approved.id, error = %e, "Failed to record execution result");
                None
            }
        };

        let answer = if report.success {
            format!("Done. {}", report.message)
        } else {
            format!("The action was approved but failed: {}", report.message)
        };

        let mut response =
            TurnResponse::new(TurnKind::ConfirmationResolved, answer, report.success);
        response.tools_used = vec![approved.tool_name.clone()];
        if !report.success {
            response.error = Some(report.message);
        }
        response.pending_action = recorded.or(Some(approved));
        response
    }

    // ========================================================================
    // Graph
    // ========================================================================

    async fn recent_history(&self, request: &TurnRequest) -> Vec<HistoryMessage> {
        let Some(history) = &self.history else {
            return Vec::new();
        };
        match history
            .get_recent(
                &request.session_id,
                &request.user_id,
                self.config.history_window(),
            )
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "Session history unavailable, continuing without it");
                Vec::new()
            }
        }
    }

    async fn run_graph(&self, state: &mut TurnState) {
        let mut node = Node::AssessClarity;
        loop {
            let next = match node {
                Node::AssessClarity => {
                    self.assess_clarity(state).await;
                    route_after_clarity(state, self.config.max_clarification_attempts)
                }
                Node::ReturnClarification => {
                    self.return_clarification(state).await;
                    break;
                }
                Node::ClassifyIntent => {
                    self.classify_intent(state).await;
                    route_after_intent(state)
                }
                Node::ExecuteQuery => {
                    self.execute_query(state).await;
                    route_after_query(state)
                }
                Node::ExecuteReport => {
                    self.execute_report(state).await;
                    route_after_report(state)
                }
                Node::ExecuteNotify => {
                    self.execute_notify(state).await;
                    Node::FormatResponse
                }
                Node::FormatResponse => {
                    format_response(state);
                    break;
                }
            };
            tracing::debug!(from = node.name(), to = next.name(), "Route");
            node = next;
        }
    }

    async fn assess_clarity(&self, state: &mut TurnState) {
        let utterance = state.effective_utterance.clone();
        let (assessment, intent) = tokio::join!(
            self.gate.assess(&utterance, &state.history),
            self.classifier.classify(&utterance)
        );
        state.cached_intent = Some(intent);

        let assessment = match assessment.combined_question.clone() {
            Some(combined) => {
                // The raw text was only an answer; judge and classify the whole question
                tracing::info!(combined = %combined, "Clarification answered, re-assessing combined question");
                state.cached_intent = None;
                state.effective_utterance = combined.clone();
                let mut reassessed = self.gate.assess(&combined, &[]).await;
                reassessed.combined_question = Some(combined);
                reassessed
            }
            None => assessment,
        };

        state.needs_clarification = !assessment.is_clear;
        if state.needs_clarification {
            state.clarification_attempts = prior_clarification_attempts(&state.history) + 1;
            if state.clarification_attempts > self.config.max_clarification_attempts {
                tracing::info!(
                    attempts = state.clarification_attempts,
                    "Clarification limit reached, proceeding as clear"
                );
            }
        }
        tracing::debug!(
            is_clear = assessment.is_clear,
            confidence = assessment.confidence,
            source = ?assessment.source,
            "Clarity assessed"
        );
        state.clarity = Some(assessment);
    }

    async fn return_clarification(&self, state: &mut TurnState) {
        let Some(assessment) = state.clarity.as_ref() else {
            return;
        };
        let question = self
            .questions
            .generate(&state.effective_utterance, assessment)
            .await;
        state.answer = question.render();
        state.clarification = Some(question);
        state.success = true;
    }

    async fn classify_intent(&self, state: &mut TurnState) {
        let classification = match state.cached_intent.take() {
            Some(cached) => cached,
            None => self.classifier.classify(&state.effective_utterance).await,
        };
        tracing::info!(
            intent = %classification.intent,
            source = ?classification.source,
            recipient = classification.recipient.as_deref(),
            "Intent classified"
        );
        state.intent = Some(classification);
    }

    async fn execute_query(&self, state: &mut TurnState) {
        state.record_tool("query");
        let request = QueryRequest {
            role: state.request.role.clone(),
            utterance: state.effective_utterance.clone(),
            user_id: state.request.user_id.clone(),
            history: state.history.clone(),
            timeout_secs: self.config.query_timeout_secs,
            max_rows: self.config.query_max_rows,
        };
        let result = settle("query", self.query_tool.run(request).await).and_then(|output| {
            output.ok_or_else(|| "query tool returned no result".to_string())
        });
        state.query = Some(result);
    }

    async fn execute_report(&self, state: &mut TurnState) {
        state.record_tool("report");
        let format = state
            .intent
            .as_ref()
            .and_then(|i| i.report_format)
            .unwrap_or_default();
        let request = ReportRequest {
            role: state.request.role.clone(),
            utterance: state.effective_utterance.clone(),
            user_id: state.request.user_id.clone(),
            format,
            precomputed: state.query_output().cloned(),
        };
        let result = settle("report", self.report_tool.run(request).await).and_then(|output| {
            output.ok_or_else(|| "report tool returned no report".to_string())
        });
        state.report = Some(result);
    }

    async fn resolve_recipient(&self, recipient: &str, user_id: &str) -> StageResult<String> {
        if recipient != SELF_RECIPIENT {
            return Ok(recipient.to_string());
        }
        let Some(directory) = &self.recipients else {
            return Err("no address directory is configured to resolve your address".to_string());
        };
        match directory.address_for(user_id).await {
            Ok(Some(address)) => Ok(address),
            Ok(None) => Err(format!("no email address on file for {}", user_id)),
            Err(e) => Err(format!("could not look up your address: {}", e)),
        }
    }

    async fn execute_notify(&self, state: &mut TurnState) {
        state.record_tool("notify");
        let Some(recipient) = state.recipient().map(str::to_string) else {
            state.notify = Some(Err("no recipient".to_string()));
            return;
        };

        let address = match self.resolve_recipient(&recipient, &state.request.user_id).await {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(stage = "notify", error = %e, "Recipient resolution failed");
                state.notify = Some(Err(e));
                return;
            }
        };

        let (body, attachment_path) = match state.report_output() {
            Some(report) => (
                format!(
                    "Your {} report for \"{}\" is attached ({} rows).",
                    report.format.as_str(),
                    state.effective_utterance,
                    report.rows_count
                ),
                Some(report.report_path.clone()),
            ),
            None => (synthesize_body(state.query.as_ref()), None),
        };

        let request = NotifyRequest {
            role: state.request.role.clone(),
            recipient: address.clone(),
            subject: notify_subject(&state.effective_utterance),
            body,
            attachment_path,
            user_id: state.request.user_id.clone(),
        };
        let result = settle("notify", self.notify_tool.run(request).await).map(|detail| {
            NotifyOutcome {
                recipient: address,
                detail: detail.unwrap_or(serde_json::Value::Null),
            }
        });
        state.notify = Some(result);
    }

    fn into_response(state: TurnState) -> TurnResponse {
        let kind = if state.clarification.is_some() {
            TurnKind::Clarification
        } else {
            TurnKind::Answered
        };
        let mut response = TurnResponse::new(kind, state.answer, state.success);
        response.tools_used = state.tools_used;
        response.intent = state.intent.map(|i| i.intent);
        response.clarification = state.clarification;
        response.error = state.error;
        response
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct WorkflowEngineBuilder {
    config: DispatchConfig,
    llm: Option<Arc<dyn LlmClient>>,
    query_tool: Option<Arc<dyn QueryTool>>,
    report_tool: Option<Arc<dyn ReportTool>>,
    notify_tool: Option<Arc<dyn NotifyTool>>,
    history: Option<Arc<dyn SessionHistory>>,
    pending: Option<PendingActionStore>,
    executor: Option<Arc<dyn ActionExecutor>>,
    recipients: Option<Arc<dyn RecipientDirectory>>,
}

impl WorkflowEngineBuilder {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            llm: None,
            query_tool: None,
            report_tool: None,
            notify_tool: None,
            history: None,
            pending: None,
            executor: None,
            recipients: None,
        }
    }

    /// Model used by the clarity gate, classifier and question generator.
    /// Without one, every decision step uses its deterministic path.
    pub fn llm(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn query_tool(mut self, tool: Arc<dyn QueryTool>) -> Self {
        self.query_tool = Some(tool);
        self
    }

    pub fn report_tool(mut self, tool: Arc<dyn ReportTool>) -> Self {
        self.report_tool = Some(tool);
        self
    }

    pub fn notify_tool(mut self, tool: Arc<dyn NotifyTool>) -> Self {
        self.notify_tool = Some(tool);
        self
    }

    pub fn history(mut self, history: Arc<dyn SessionHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn pending_store(mut self, store: PendingActionStore) -> Self {
        self.pending = Some(store);
        self
    }

    pub fn action_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn recipients(mut self, directory: Arc<dyn RecipientDirectory>) -> Self {
        self.recipients = Some(directory);
        self
    }

    pub fn build(self) -> Result<WorkflowEngine, ConfigError> {
        self.config.validate()?;

        let query_tool = self
            .query_tool
            .ok_or_else(|| ConfigError::invalid("query_tool", "a query tool is required"))?;
        let report_tool = self
            .report_tool
            .ok_or_else(|| ConfigError::invalid("report_tool", "a report tool is required"))?;
        let notify_tool = self
            .notify_tool
            .ok_or_else(|| ConfigError::invalid("notify_tool", "a notify tool is required"))?;

        let (gate, classifier, questions) = match &self.llm {
            Some(client) => (
                ClarityGate::new(client.clone(), &self.config),
                IntentClassifier::new(client.clone(), &self.config),
                QuestionGenerator::new(client.clone(), &self.config),
            ),
            None => (
                ClarityGate::heuristic_only(&self.config),
                IntentClassifier::keywords_only(&self.config),
                QuestionGenerator::fallback_only(&self.config),
            ),
        };

        let pending = self
            .pending
            .unwrap_or_else(|| PendingActionStore::in_memory(self.config.pending_ttl()));

        Ok(WorkflowEngine {
            config: self.config,
            gate,
            classifier,
            questions,
            query_tool,
            report_tool,
            notify_tool,
            history: self.history,
            pending,
            executor: self.executor,
            recipients: self.recipients,
        })
    }
}
