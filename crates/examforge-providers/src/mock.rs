//! Mock collaborators for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use examforge_core::explain::DEFAULT_MODEL;
use examforge_core::model::{AccessGrant, Bank, BankId, Question, User};
use examforge_core::traits::{
    AccessDirectory, AttemptRecord, AttemptRecorder, ExplainRequest, Explanation,
    ExplanationService, IdentityProvider, QuestionStore,
};

/// A mock explanation service for exercising the engine without API calls.
///
/// Returns a fixed response, or fails every call when built with `failing`.
pub struct MockExplainer {
    response: Result<String, String>,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<ExplainRequest>>,
}

impl MockExplainer {
    /// Create a mock that always returns the same text.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock whose every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Get the number of calls made to this service.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this service.
    pub fn last_request(&self) -> Option<ExplainRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl ExplanationService for MockExplainer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn explain(&self, request: &ExplainRequest) -> anyhow::Result<Explanation> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        match &self.response {
            Ok(text) => Ok(Explanation {
                text: text.clone(),
                model: Some(DEFAULT_MODEL.to_string()),
                latency_ms: 1,
            }),
            Err(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}

/// In-memory question store.
#[derive(Default)]
pub struct MockQuestionStore {
    banks: Vec<(Bank, Vec<Question>)>,
    fail: bool,
    call_count: AtomicU32,
}

impl MockQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bank(mut self, id: &str, name: &str, questions: Vec<Question>) -> Self {
        self.banks.push((
            Bank {
                id: BankId::from(id),
                name: name.to_string(),
            },
            questions,
        ));
        self
    }

    /// Every fetch fails, as an unreachable backend would.
    pub fn unreachable() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl QuestionStore for MockQuestionStore {
    async fn fetch_questions(&self, bank_ids: &[BankId]) -> anyhow::Result<Vec<Question>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            anyhow::bail!("question store unreachable");
        }
        Ok(self
            .banks
            .iter()
            .filter(|(bank, _)| bank_ids.contains(&bank.id))
            .flat_map(|(_, qs)| qs.iter().cloned())
            .collect())
    }

    async fn list_banks(&self) -> anyhow::Result<Vec<Bank>> {
        if self.fail {
            anyhow::bail!("question store unreachable");
        }
        Ok(self.banks.iter().map(|(bank, _)| bank.clone()).collect())
    }
}

/// Records attempts in memory; optionally fails every write.
#[derive(Default)]
pub struct MockAttemptRecorder {
    attempts: Mutex<Vec<AttemptRecord>>,
    fail: bool,
}

impl MockAttemptRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AttemptRecorder for MockAttemptRecorder {
    async fn log_attempt(&self, attempt: &AttemptRecord) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("insert rejected by row-level security");
        }
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(attempt.clone());
        }
        Ok(())
    }
}

/// Fixed identity and grants.
#[derive(Default)]
pub struct MockIdentity {
    user: Option<User>,
    grants: Vec<AccessGrant>,
}

impl MockIdentity {
    pub fn signed_in(id: &str, email: &str) -> Self {
        Self {
            user: Some(User {
                id: id.to_string(),
                email: email.to_string(),
            }),
            grants: Vec::new(),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_grant(mut self, grant: AccessGrant) -> Self {
        self.grants.push(grant);
        self
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn current_user(&self) -> anyhow::Result<Option<User>> {
        Ok(self.user.clone())
    }
}

#[async_trait]
impl AccessDirectory for MockIdentity {
    async fn access_grants(&self) -> anyhow::Result<Vec<AccessGrant>> {
        Ok(self.grants.clone())
    }
}
