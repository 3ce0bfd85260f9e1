//! Conversational turn dispatcher
//!
//! Takes a raw utterance and decides whether it is clear enough to act on,
//! which capabilities it needs (query, report, notify) and in what order
//! they run. Side-effecting requests are parked as pending actions until the
//! user confirms them on a later turn.
//!
//! ## Architecture
//!
//! ```text
//! Utterance → [confirmation? | action request?] → WorkflowEngine
//!                                                    ├─ ClarityGate ┐ (joined)
//!                                                    ├─ IntentClassifier ┘
//!                                                    └─ query → report → notify → answer
//! ```
//!
//! ## Backend Selection
//!
//! Set `AGENT_BACKEND` environment variable:
//! - `anthropic` (default): Anthropic Claude API
//! - `openai`: OpenAI API

pub mod agentic;
pub mod clarify;
pub mod config;
pub mod error;
pub mod intent;
pub mod pending;
pub mod tools;
pub mod workflow;

// Re-exports for convenience
pub use agentic::{AgentBackend, CompletionRequest, LlmClient};
pub use clarify::{ClarificationQuestion, ClarityAssessment, ClarityGate, ReasonCode};
pub use config::DispatchConfig;
pub use error::{ConfigError, DecisionFailure, PendingStoreError};
pub use intent::{Intent, IntentClassifier, IntentClassification, ReportFormat, SELF_RECIPIENT};
pub use pending::{
    ActionStatus, ActionType, InMemoryPendingBackend, NewPendingAction, PendingAction,
    PendingActionStore, PendingFilter, ResolveOutcome, ResumeToken,
};
pub use tools::{HistoryMessage, SessionHistory};
pub use workflow::{TurnKind, TurnRequest, TurnResponse, WorkflowEngine, WorkflowEngineBuilder};
