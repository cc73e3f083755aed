//! Email allowlist gating for practice sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StartError;
use crate::model::{AccessGrant, User};

/// Who may start a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// When false every signed-in user may practice.
    #[serde(default)]
    pub enforce: bool,
    /// Statically allowed emails, matched case-insensitively.
    #[serde(default)]
    pub allowed_emails: Vec<String>,
}

impl AccessPolicy {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn allowlist<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            enforce: true,
            allowed_emails: emails
                .into_iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn allows(&self, email: &str, grants: &[AccessGrant], now: DateTime<Utc>) -> bool {
        if !self.enforce {
            return true;
        }
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return false;
        }
        if self.allowed_emails.iter().any(|e| e.to_lowercase() == email) {
            return true;
        }
        grants.iter().any(|g| {
            g.allowed
                && g.email.to_lowercase() == email
                && g.expires_at.is_none_or(|exp| exp >= now)
        })
    }

    /// # Errors
    ///
    /// Returns `StartError::AccessDenied` when the user is not allowed.
    pub fn check(
        &self,
        user: &User,
        grants: &[AccessGrant],
        now: DateTime<Utc>,
    ) -> Result<(), StartError> {
        if self.allows(&user.email, grants, now) {
            Ok(())
        } else {
            Err(StartError::AccessDenied {
                email: user.email.clone(),
            })
        }
    }
}
