//! Collaborator trait definitions.
//!
//! The practice runner never talks to a backend directly. Identity, question
//! storage, attempt logging, access grants and AI explanations are reached
//! through these async traits, implemented by `examforge-providers`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::explain::ExplainMode;
use crate::model::{AccessGrant, Bank, BankId, Question, QuestionId, User};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Supplies the signed-in learner, if any.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> anyhow::Result<Option<User>>;
}

/// Source of access grants used to gate practice.
#[async_trait]
pub trait AccessDirectory: Send + Sync {
    async fn access_grants(&self) -> anyhow::Result<Vec<AccessGrant>>;
}

// ---------------------------------------------------------------------------
// Question store
// ---------------------------------------------------------------------------

/// Read access to question banks.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// All questions belonging to any of the given banks.
    async fn fetch_questions(&self, bank_ids: &[BankId]) -> anyhow::Result<Vec<Question>>;

    /// Banks available for selection, newest first.
    async fn list_banks(&self) -> anyhow::Result<Vec<Bank>>;
}

// ---------------------------------------------------------------------------
// Attempt recorder
// ---------------------------------------------------------------------------

/// Best-effort sink for per-answer telemetry. The return value is only logged.
#[async_trait]
pub trait AttemptRecorder: Send + Sync {
    async fn log_attempt(&self, attempt: &AttemptRecord) -> anyhow::Result<()>;
}

/// One submitted answer, captured by value at submit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub user_id: String,
    pub question_id: QuestionId,
    /// Index into the shuffled answer list; `None` for a timed-out skip.
    pub selected_index: Option<usize>,
    /// Text of the selected answer, as the backend stores it.
    pub selected_text: Option<String>,
    pub is_correct: bool,
    pub seconds_spent: u64,
}

// ---------------------------------------------------------------------------
// Explanation service
// ---------------------------------------------------------------------------

/// Backend that turns a question into a teaching explanation.
#[async_trait]
pub trait ExplanationService: Send + Sync {
    /// Human-readable service name (e.g. "openrouter").
    fn name(&self) -> &str;

    async fn explain(&self, request: &ExplainRequest) -> anyhow::Result<Explanation>;
}

/// Question context for an explanation, in the order the learner sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub stem: String,
    pub answers: Vec<String>,
    /// Correct option within `answers` (the shuffled order).
    pub correct_index: usize,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub mode: ExplainMode,
}

/// Explanation text returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub text: String,
    /// Model that produced the text, when the service reports it.
    #[serde(default)]
    pub model: Option<String>,
    pub latency_ms: u64,
}
