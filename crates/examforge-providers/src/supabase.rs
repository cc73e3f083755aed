//! Supabase REST and auth client.
//!
//! One client implements every backend collaborator the practice runner
//! needs: identity, question and bank reads, attempt inserts and access
//! grants. It also looks up the shared AI key used by the OpenRouter
//! explainer.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use examforge_core::error::ServiceError;
use examforge_core::model::{AccessGrant, Answer, Bank, BankId, Question, QuestionId, User};
use examforge_core::traits::{
    AccessDirectory, AttemptRecord, AttemptRecorder, IdentityProvider, QuestionStore,
};

use crate::error::{check_status, json_body, send_error};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const QUESTION_COLUMNS: &str = "id,stem,image_url,answers";

/// Shared AI key row (`ai_keys` where `id = 'public'`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AiKey {
    pub key: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Supabase project client.
pub struct SupabaseClient {
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
    client: reqwest::Client,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .field("anon_key", &"***")
            .field("signed_in", &self.has_session())
            .finish()
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<AuthUser> for User {
    fn from(user: AuthUser) -> Self {
        User {
            id: user.id,
            email: user.email.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct QuestionRow {
    id: serde_json::Value,
    stem: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    answers: Option<Vec<Answer>>,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        let id = match row.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Question {
            id: Some(QuestionId(id)),
            stem: row.stem,
            image_url: row.image_url,
            answers: row.answers.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct BankRow {
    id: serde_json::Value,
    name: String,
}

#[derive(Deserialize)]
struct GrantRow {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    allowed: Option<bool>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct AttemptRow<'a> {
    user_id: &'a str,
    question_id: &'a str,
    selected: Option<&'a str>,
    is_correct: bool,
    seconds_spent: u64,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: RwLock::new(None),
            client,
        }
    }

    /// Reuse an access token from an earlier sign-in.
    #[must_use]
    pub fn with_access_token(self, token: Option<String>) -> Self {
        self.set_access_token(token);
        self
    }

    pub fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.access_token.write() {
            *guard = token.filter(|t| !t.is_empty());
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().ok().and_then(|t| t.clone())
    }

    pub fn has_session(&self) -> bool {
        self.access_token().is_some()
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, ServiceError> {
        reqwest::Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| ServiceError::NetworkError(format!("invalid Supabase URL: {e}")))
    }

    fn bearer(&self) -> String {
        self.access_token()
            .unwrap_or_else(|| self.anon_key.clone())
    }

    /// A request carrying the project key and the current bearer token.
    fn request(&self, method: reqwest::Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
    }

    fn get(&self, url: reqwest::Url) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::GET, url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        let response = request
            .send()
            .await
            .map_err(|e| send_error(e, DEFAULT_TIMEOUT_SECS))?;
        check_status(response).await
    }

    /// Exchange email and password for a session and keep its access token.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> anyhow::Result<User> {
        let mut url = self.url("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let request = self
            .request(reqwest::Method::POST, url)
            .json(&PasswordGrant { email, password });
        let token: TokenResponse = json_body(self.send(request).await?).await?;

        self.set_access_token(Some(token.access_token));
        tracing::info!(user = %token.user.id, "signed in");
        Ok(token.user.into())
    }

    /// The shared AI key, if the project has one configured.
    #[instrument(skip(self))]
    pub async fn fetch_public_ai_key(&self) -> anyhow::Result<Option<AiKey>> {
        let mut url = self.url("/rest/v1/ai_keys")?;
        url.query_pairs_mut()
            .append_pair("select", "key,model")
            .append_pair("id", "eq.public");

        let rows: Vec<AiKey> = json_body(self.send(self.get(url)).await?).await?;
        Ok(rows.into_iter().find(|k| !k.key.trim().is_empty()))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    #[instrument(skip(self))]
    async fn current_user(&self) -> anyhow::Result<Option<User>> {
        if !self.has_session() {
            return Ok(None);
        }
        let url = self.url("/auth/v1/user")?;
        match self.send(self.get(url)).await {
            Ok(response) => {
                let user: AuthUser = json_body(response).await?;
                Ok(Some(user.into()))
            }
            Err(ServiceError::AuthenticationFailed(body)) => {
                tracing::debug!("session rejected: {body}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl QuestionStore for SupabaseClient {
    #[instrument(skip(self), fields(banks = bank_ids.len()))]
    async fn fetch_questions(&self, bank_ids: &[BankId]) -> anyhow::Result<Vec<Question>> {
        let filter = match bank_ids {
            [] => return Ok(Vec::new()),
            [only] => format!("eq.{only}"),
            many => format!(
                "in.({})",
                many.iter()
                    .map(|b| b.0.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        };

        let mut url = self.url("/rest/v1/questions")?;
        url.query_pairs_mut()
            .append_pair("select", QUESTION_COLUMNS)
            .append_pair("bank_id", &filter)
            .append_pair("order", "created_at.desc");

        let rows: Vec<QuestionRow> = json_body(self.send(self.get(url)).await?).await?;
        tracing::debug!(count = rows.len(), "fetched questions");
        Ok(rows.into_iter().map(Question::from).collect())
    }

    #[instrument(skip(self))]
    async fn list_banks(&self) -> anyhow::Result<Vec<Bank>> {
        let mut url = self.url("/rest/v1/banks")?;
        url.query_pairs_mut()
            .append_pair("select", "id,name")
            .append_pair("order", "created_at.desc");

        let rows: Vec<BankRow> = json_body(self.send(self.get(url)).await?).await?;
        Ok(rows
            .into_iter()
            .map(|row| Bank {
                id: BankId(match row.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
                name: row.name,
            })
            .collect())
    }
}

#[async_trait]
impl AttemptRecorder for SupabaseClient {
    #[instrument(skip(self, attempt), fields(question_id = %attempt.question_id))]
    async fn log_attempt(&self, attempt: &AttemptRecord) -> anyhow::Result<()> {
        let url = self.url("/rest/v1/attempts")?;
        let row = AttemptRow {
            user_id: &attempt.user_id,
            question_id: &attempt.question_id.0,
            selected: attempt.selected_text.as_deref(),
            is_correct: attempt.is_correct,
            seconds_spent: attempt.seconds_spent,
        };
        let request = self
            .request(reqwest::Method::POST, url)
            .header("Prefer", "return=minimal")
            .json(&row);
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl AccessDirectory for SupabaseClient {
    #[instrument(skip(self))]
    async fn access_grants(&self) -> anyhow::Result<Vec<AccessGrant>> {
        let mut url = self.url("/rest/v1/access_grants")?;
        url.query_pairs_mut()
            .append_pair("select", "email,allowed,expires_at");

        let rows: Vec<GrantRow> = json_body(self.send(self.get(url)).await?).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let email = row.email.filter(|e| !e.trim().is_empty())?;
                Some(AccessGrant {
                    email,
                    allowed: row.allowed.unwrap_or(true),
                    expires_at: row.expires_at,
                })
            })
            .collect())
    }
}
