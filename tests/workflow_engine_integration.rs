//! End-to-end turns through the workflow engine with scripted collaborators

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{engine_with, BrokenHistory, RecordingTools, ScriptedLlm, ToolCall, CLARITY, INTENT, QUESTION};
use turn_dispatch::tools::InMemorySessionHistory;
use turn_dispatch::{
    ActionStatus, DispatchConfig, Intent, SessionHistory, TurnKind, TurnRequest, TurnResponse,
    WorkflowEngine,
};

const QUERY_INTENT: &str = r#"{"intent": "query", "report_format": null, "recipient": null, "confidence": 0.9}"#;

fn turn(utterance: &str) -> TurnRequest {
    TurnRequest::new("session-1", "alice", "analyst", utterance)
}

/// Runs turns against one engine and records every exchange in session history
struct Conversation {
    engine: WorkflowEngine,
    history: Arc<InMemorySessionHistory>,
}

impl Conversation {
    fn new(config: DispatchConfig, tools: Arc<RecordingTools>, llm: Option<Arc<ScriptedLlm>>) -> Self {
        let history = Arc::new(InMemorySessionHistory::new());
        let shared: Arc<dyn SessionHistory> = history.clone();
        Self {
            engine: engine_with(config, tools, llm, Some(shared)),
            history,
        }
    }

    async fn say(&self, utterance: &str) -> TurnResponse {
        let response = self.engine.handle_turn(turn(utterance)).await;
        self.history
            .record_exchange("session-1", "alice", utterance, response.history_entry())
            .await;
        response
    }
}

// =============================================================================
// CLARITY
// =============================================================================

#[tokio::test]
async fn test_greeting_gets_capability_options_without_model_calls() {
    let tools = Arc::new(RecordingTools::new());
    let llm = Arc::new(ScriptedLlm::new().on(INTENT, QUERY_INTENT));
    let engine = engine_with(DispatchConfig::default(), tools.clone(), Some(llm.clone()), None);

    let response = engine.handle_turn(turn("hi")).await;

    assert_eq!(response.kind, TurnKind::Clarification);
    assert!(response.success);
    let question = response.clarification.expect("clarification attached");
    assert!(!question.options.is_empty());
    assert_eq!(llm.calls_to(CLARITY), 0);
    assert_eq!(llm.calls_to(QUESTION), 0);
    assert!(tools.calls().is_empty());
    assert!(response.tools_used.is_empty());
}

#[tokio::test]
async fn test_allow_listed_request_skips_clarity_model() {
    let tools = Arc::new(RecordingTools::new());
    let llm = Arc::new(ScriptedLlm::new().on(INTENT, QUERY_INTENT));
    let engine = engine_with(DispatchConfig::default(), tools.clone(), Some(llm.clone()), None);

    let response = engine.handle_turn(turn("show me the top 10 records")).await;

    assert_eq!(response.kind, TurnKind::Answered);
    assert!(response.success);
    assert_eq!(response.intent, Some(Intent::Query));
    assert_eq!(response.tools_used, vec!["query"]);
    assert!(response.answer.contains("Here are the top records."));
    assert_eq!(llm.calls_to(CLARITY), 0);
    assert_eq!(
        tools.calls(),
        vec![ToolCall::Query {
            utterance: "show me the top 10 records".into(),
            max_rows: DispatchConfig::default().query_max_rows,
        }]
    );
}

#[tokio::test]
async fn test_clarity_model_failure_fails_open() {
    let tools = Arc::new(RecordingTools::new());
    let llm = Arc::new(
        ScriptedLlm::new()
            .failing(CLARITY, "provider returned 503")
            .on(INTENT, QUERY_INTENT),
    );
    let engine = engine_with(DispatchConfig::default(), tools.clone(), Some(llm.clone()), None);

    let response = engine.handle_turn(turn("revenue per region during 2023")).await;

    assert_eq!(llm.calls_to(CLARITY), 1);
    assert_eq!(response.kind, TurnKind::Answered);
    assert_eq!(response.tools_used, vec!["query"]);
}

#[tokio::test]
async fn test_model_unclear_verdict_asks_generated_question() {
    let tools = Arc::new(RecordingTools::new());
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(
                CLARITY,
                r#"{"is_clear": false, "confidence": 0.2, "reason": "missing_metric", "missing_info": ["metric"], "possible_intents": ["Total revenue per region", "Order count per region"]}"#,
            )
            .on(INTENT, QUERY_INTENT)
            .on(
                QUESTION,
                r#"{"question": "Which metric per region?", "options": ["Revenue", "Orders"]}"#,
            ),
    );
    let engine = engine_with(DispatchConfig::default(), tools.clone(), Some(llm.clone()), None);

    let response = engine.handle_turn(turn("revenue per region during 2023")).await;

    assert_eq!(response.kind, TurnKind::Clarification);
    let question = response.clarification.expect("clarification attached");
    assert_eq!(question.question, "Which metric per region?");
    assert_eq!(question.options, vec!["Revenue", "Orders"]);
    assert!(response.answer.starts_with("Which metric per region?"));
    assert!(tools.calls().is_empty());
}

#[tokio::test]
async fn test_question_model_failure_uses_possible_intents() {
    let tools = Arc::new(RecordingTools::new());
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(
                CLARITY,
                r#"{"is_clear": false, "confidence": 0.2, "reason": "missing_metric", "missing_info": ["metric"], "possible_intents": ["Total revenue per region", "Order count per region"]}"#,
            )
            .on(INTENT, QUERY_INTENT)
            .failing(QUESTION, "timeout"),
    );
    let engine = engine_with(DispatchConfig::default(), tools, Some(llm.clone()), None);

    let response = engine.handle_turn(turn("revenue per region during 2023")).await;

    let question = response.clarification.expect("fallback question");
    assert!(question.question.contains("metric"));
    assert_eq!(
        question.options,
        vec!["Total revenue per region", "Order count per region"]
    );
    assert_eq!(llm.calls_to(QUESTION), 1);
}

#[tokio::test]
async fn test_confident_clear_below_threshold_is_unclear() {
    let tools = Arc::new(RecordingTools::new());
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(CLARITY, r#"{"is_clear": true, "confidence": 0.3}"#)
            .on(INTENT, QUERY_INTENT)
            .failing(QUESTION, "down"),
    );
    let engine = engine_with(DispatchConfig::default(), tools.clone(), Some(llm), None);

    let response = engine.handle_turn(turn("revenue per region during 2023")).await;

    assert_eq!(response.kind, TurnKind::Clarification);
    assert!(tools.calls().is_empty());
}

#[tokio::test]
async fn test_followup_answer_runs_the_combined_question() {
    let tools = Arc::new(RecordingTools::new());
    let chat = Conversation::new(DispatchConfig::default(), tools.clone(), None);

    let first = chat.say("sales").await;
    assert_eq!(first.kind, TurnKind::Clarification);

    let second = chat.say("for last quarter by region").await;
    assert_eq!(second.kind, TurnKind::Answered);
    assert_eq!(
        tools.calls(),
        vec![ToolCall::Query {
            utterance: "sales for last quarter by region".into(),
            max_rows: DispatchConfig::default().query_max_rows,
        }]
    );
}

#[tokio::test]
async fn test_clarification_attempts_are_bounded() {
    let config = DispatchConfig {
        min_words: 10,
        ..DispatchConfig::default()
    };
    let tools = Arc::new(RecordingTools::new());
    let chat = Conversation::new(config, tools.clone(), None);

    for utterance in ["orders", "last week", "in europe"] {
        let response = chat.say(utterance).await;
        assert_eq!(response.kind, TurnKind::Clarification, "after {:?}", utterance);
    }
    assert!(tools.calls().is_empty());

    // Fourth attempt exceeds the limit of three and proceeds
    let response = chat.say("please").await;
    assert_eq!(response.kind, TurnKind::Answered);
    assert_eq!(
        tools.calls(),
        vec![ToolCall::Query {
            utterance: "orders last week in europe please".into(),
            max_rows: DispatchConfig::default().query_max_rows,
        }]
    );
}

/// Turns of single words until one is answered; returns the answered turn number
async fn rounds_until_answered(config: DispatchConfig, tools: Arc<RecordingTools>) -> usize {
    let words = [
        "orders", "region", "europe", "quarterly", "totals", "shipped", "pending", "weekly",
        "invoices", "suppliers", "germany", "backlog",
    ];
    let chat = Conversation::new(config, tools, None);
    for (turn, word) in words.iter().enumerate() {
        if chat.say(word).await.kind == TurnKind::Answered {
            return turn + 1;
        }
    }
    panic!("no turn was answered within {} rounds", words.len());
}

#[tokio::test]
async fn test_attempt_bound_holds_with_a_small_history_limit() {
    let config = DispatchConfig {
        min_words: 100,
        history_limit: 4,
        max_clarification_attempts: 3,
        ..DispatchConfig::default()
    };
    assert!(config.validate().is_ok());
    let tools = Arc::new(RecordingTools::new());

    assert_eq!(rounds_until_answered(config, tools.clone()).await, 4);
    match tools.calls().first() {
        Some(ToolCall::Query { utterance, .. }) => {
            assert_eq!(utterance, "orders region europe quarterly")
        }
        other => panic!("expected query, got {:?}", other),
    }
}

#[tokio::test]
async fn test_attempt_bound_holds_beyond_the_default_history_limit() {
    let config = DispatchConfig {
        min_words: 100,
        max_clarification_attempts: 6,
        ..DispatchConfig::default()
    };
    let tools = Arc::new(RecordingTools::new());

    assert_eq!(rounds_until_answered(config, tools.clone()).await, 7);
    match tools.calls().first() {
        Some(ToolCall::Query { utterance, .. }) => assert!(utterance.starts_with("orders ")),
        other => panic!("expected query, got {:?}", other),
    }
}

// =============================================================================
// TOOL CHAINS
// =============================================================================

#[tokio::test]
async fn test_combined_request_chains_query_report_notify() {
    let tools = Arc::new(RecordingTools::new());
    let llm = Arc::new(ScriptedLlm::new().failing(INTENT, "rate limited"));
    let engine = engine_with(DispatchConfig::default(), tools.clone(), Some(llm), None);

    let response = engine
        .handle_turn(turn(
            "generate an excel report and email it to ops@example.com",
        ))
        .await;

    assert_eq!(response.intent, Some(Intent::Combined));
    assert_eq!(response.tools_used, vec!["query", "report", "notify"]);
    assert!(response.success);
    assert!(response.error.is_none());

    let calls = tools.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(calls[0], ToolCall::Query { .. }));
    assert_eq!(calls[1], ToolCall::Report { has_precomputed: true });
    match &calls[2] {
        ToolCall::Notify {
            recipient,
            attachment,
            ..
        } => {
            assert_eq!(recipient, "ops@example.com");
            assert_eq!(attachment.as_deref(), Some("/reports/result.xlsx"));
        }
        other => panic!("expected notify, got {:?}", other),
    }

    let query_at = response.answer.find("Here are the top records.").unwrap();
    let report_at = response.answer.find("/reports/result.xlsx").unwrap();
    let notify_at = response.answer.find("Sent to ops@example.com").unwrap();
    assert!(query_at < report_at && report_at < notify_at);
}

#[tokio::test]
async fn test_notify_to_self_sends_rows_in_body() {
    let tools = Arc::new(RecordingTools::new());
    let engine = engine_with(DispatchConfig::default(), tools.clone(), None, None);

    let response = engine
        .handle_turn(turn("send me the list of active customers in germany"))
        .await;

    assert_eq!(response.intent, Some(Intent::Notify));
    assert_eq!(response.tools_used, vec!["query", "notify"]);
    match tools.calls().last() {
        Some(ToolCall::Notify {
            recipient,
            body,
            attachment,
        }) => {
            assert_eq!(recipient, "me@example.com");
            assert!(body.contains("Acme"));
            assert!(attachment.is_none());
        }
        other => panic!("expected notify, got {:?}", other),
    }
}

#[tokio::test]
async fn test_report_failure_keeps_query_answer() {
    let tools = Arc::new(RecordingTools {
        report_error: Some("template missing".into()),
        ..RecordingTools::default()
    });
    let engine = engine_with(DispatchConfig::default(), tools.clone(), None, None);

    let response = engine
        .handle_turn(turn("generate an excel report of top customers"))
        .await;

    assert_eq!(response.intent, Some(Intent::Report));
    assert!(response.success);
    assert!(response.answer.contains("Here are the top records."));
    assert!(response.answer.contains("template missing"));
    assert!(response.error.as_deref().unwrap().contains("template missing"));
}

#[tokio::test]
async fn test_query_failure_is_reported_not_raised() {
    let tools = Arc::new(RecordingTools {
        query_error: Some("warehouse unavailable".into()),
        ..RecordingTools::default()
    });
    let engine = engine_with(DispatchConfig::default(), tools, None, None);

    let response = engine.handle_turn(turn("show me the top 10 records")).await;

    assert_eq!(response.kind, TurnKind::Answered);
    assert!(!response.success);
    assert!(response.answer.contains("warehouse unavailable"));
}

#[tokio::test]
async fn test_history_outage_does_not_block_the_turn() {
    let tools = Arc::new(RecordingTools::new());
    let engine = engine_with(
        DispatchConfig::default(),
        tools,
        None,
        Some(Arc::new(BrokenHistory)),
    );

    let response = engine.handle_turn(turn("show me the top 10 records")).await;

    assert_eq!(response.kind, TurnKind::Answered);
    assert!(response.success);
}

// =============================================================================
// CONFIRMATION
// =============================================================================

#[tokio::test]
async fn test_confirmed_action_is_executed() {
    let tools = Arc::new(RecordingTools::new());
    let engine = engine_with(DispatchConfig::default(), tools.clone(), None, None);

    let prompt = engine
        .handle_turn(turn("grant alice read access to sales"))
        .await;
    assert_eq!(prompt.kind, TurnKind::ConfirmationPrompt);
    assert!(prompt.answer.contains("grant alice read access to sales"));
    let pending = prompt.pending_action.expect("pending action created");
    assert_eq!(pending.status, ActionStatus::Pending);
    assert!(tools.calls().is_empty());

    let resolved = engine.handle_turn(turn("yes")).await;
    assert_eq!(resolved.kind, TurnKind::ConfirmationResolved);
    assert!(resolved.success);
    assert_eq!(
        resolved.pending_action.as_ref().map(|a| a.status),
        Some(ActionStatus::Executed)
    );
    assert_eq!(
        tools.calls(),
        vec![ToolCall::Execute {
            tool_name: "grant_access".into()
        }]
    );

    let stored = engine.pending_store().get(pending.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ActionStatus::Executed);
    assert!(stored.executed_at.is_some());
}

#[tokio::test]
async fn test_rejected_action_never_runs() {
    let tools = Arc::new(RecordingTools::new());
    let engine = engine_with(DispatchConfig::default(), tools.clone(), None, None);

    engine
        .handle_turn(turn("revoke bob's access to warehouse"))
        .await;
    let resolved = engine.handle_turn(turn("no, cancel that")).await;

    assert_eq!(resolved.kind, TurnKind::ConfirmationResolved);
    assert_eq!(
        resolved.pending_action.map(|a| a.status),
        Some(ActionStatus::Rejected)
    );
    assert!(tools.calls().is_empty());
}

#[tokio::test]
async fn test_failed_execution_is_recorded() {
    let tools = Arc::new(RecordingTools {
        execute_fails: true,
        ..RecordingTools::default()
    });
    let engine = engine_with(DispatchConfig::default(), tools, None, None);

    engine
        .handle_turn(turn("register a new user carol as an analyst"))
        .await;
    let resolved = engine.handle_turn(turn("confirm")).await;

    assert!(!resolved.success);
    assert_eq!(
        resolved.pending_action.map(|a| a.status),
        Some(ActionStatus::Failed)
    );
    assert!(resolved.error.is_some());
}

#[tokio::test]
async fn test_late_confirmation_reports_expiry() {
    let config = DispatchConfig {
        pending_ttl_secs: 0,
        ..DispatchConfig::default()
    };
    let tools = Arc::new(RecordingTools::new());
    let engine = engine_with(config, tools.clone(), None, None);

    engine
        .handle_turn(turn("grant alice read access to sales"))
        .await;
    let resolved = engine.handle_turn(turn("yes")).await;

    assert_eq!(resolved.kind, TurnKind::ConfirmationResolved);
    assert!(!resolved.success);
    assert_eq!(
        resolved.pending_action.map(|a| a.status),
        Some(ActionStatus::Expired)
    );
    assert!(tools.calls().is_empty());
}

#[tokio::test]
async fn test_yes_with_nothing_pending_runs_the_graph() {
    let tools = Arc::new(RecordingTools::new());
    let engine = engine_with(DispatchConfig::default(), tools.clone(), None, None);

    let response = engine.handle_turn(turn("yes")).await;

    assert_eq!(response.kind, TurnKind::Clarification);
    assert!(response.pending_action.is_none());
    assert!(tools.calls().is_empty());
}

#[tokio::test]
async fn test_pending_actions_are_scoped_to_their_session() {
    let tools = Arc::new(RecordingTools::new());
    let engine = engine_with(DispatchConfig::default(), tools.clone(), None, None);

    engine
        .handle_turn(turn("grant alice read access to sales"))
        .await;
    let other = engine
        .handle_turn(TurnRequest::new("session-2", "alice", "analyst", "yes"))
        .await;

    assert_eq!(other.kind, TurnKind::Clarification);
    assert!(tools.calls().is_empty());
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_clarity_and_intent_run_concurrently() {
    let tools = Arc::new(RecordingTools::new());
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(CLARITY, r#"{"is_clear": true, "confidence": 0.9}"#)
            .delayed(CLARITY, Duration::from_millis(200))
            .on(INTENT, QUERY_INTENT)
            .delayed(INTENT, Duration::from_millis(200)),
    );
    let engine = engine_with(DispatchConfig::default(), tools, Some(llm.clone()), None);

    let started = tokio::time::Instant::now();
    let response = engine.handle_turn(turn("revenue per region during 2023")).await;
    let elapsed = started.elapsed();

    assert_eq!(response.kind, TurnKind::Answered);
    assert_eq!(llm.calls_to(CLARITY), 1);
    assert_eq!(llm.calls_to(INTENT), 1);
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(400), "took {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_clarity_call_does_not_cancel_classification() {
    let tools = Arc::new(RecordingTools::new());
    let llm = Arc::new(
        ScriptedLlm::new()
            .failing(CLARITY, "connection reset")
            .delayed(CLARITY, Duration::from_millis(50))
            .on(
                INTENT,
                r#"{"intent": "combined", "report_format": "excel", "recipient": null, "confidence": 0.95}"#,
            )
            .delayed(INTENT, Duration::from_millis(300)),
    );
    let engine = engine_with(DispatchConfig::default(), tools.clone(), Some(llm), None);

    let response = engine.handle_turn(turn("revenue per region during 2023")).await;

    // Keywords alone would have said query; the model's answer survived
    assert_eq!(response.intent, Some(Intent::Combined));
    assert_eq!(response.tools_used, vec!["query", "report", "notify"]);
}
