//! Error types for the practice runner and its collaborators.
//!
//! `SessionError` covers recoverable precondition failures inside a session;
//! its `Display` text doubles as the status line shown to the learner.
//! `ServiceError` classifies failures of remote collaborators so callers can
//! decide what to surface without string matching.

use thiserror::Error;

/// Recoverable precondition violations. None of these mutate session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Select an answer first.")]
    SelectionRequired,

    #[error("Submit all questions first.")]
    IncompleteSession,

    #[error("answer {index} is out of range (question has {available} options)")]
    AnswerOutOfRange { index: usize, available: usize },

    #[error("question {index} is out of range (session has {len} questions)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("No incorrect answers to review.")]
    NoMistakes,

    #[error("Please wait for the current explanation to finish.")]
    ExplanationInFlight,

    #[error("Enter a follow-up question first.")]
    FollowUpRequired,
}

/// Reasons a session cannot start.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Please sign in before practicing.")]
    NotSignedIn,

    #[error("Access required for {email}. Please contact an administrator.")]
    AccessDenied { email: String },

    #[error("No banks selected. Choose at least one bank to start a session.")]
    NoBanksSelected,

    #[error(transparent)]
    Identity(#[from] anyhow::Error),
}

/// Errors that can occur when talking to a remote collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Credentials were missing or rejected.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No API key is configured for the explanation service.
    #[error("no AI key available")]
    MissingApiKey,

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ServiceError {
    /// Returns `true` if re-invoking the call cannot succeed without a config change.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ServiceError::AuthenticationFailed(_) | ServiceError::MissingApiKey
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ServiceError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
