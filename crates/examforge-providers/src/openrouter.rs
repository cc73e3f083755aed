//! OpenRouter chat-completions explainer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::instrument;

use examforge_core::error::ServiceError;
use examforge_core::explain::{build_prompt, sanitize_model, SYSTEM_PROMPT};
use examforge_core::traits::{ExplainRequest, Explanation, ExplanationService};

use crate::error::{check_status, json_body, send_error};
use crate::supabase::SupabaseClient;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const TEMPERATURE: f64 = 0.2;
const TOP_P: f64 = 0.9;

/// Key and model resolved for a request.
#[derive(Clone)]
struct Credentials {
    api_key: String,
    model: String,
}

/// Explanation service backed by OpenRouter.
///
/// The API key comes from configuration, or is looked up once from the
/// Supabase `ai_keys` table and cached for the life of the explainer.
pub struct OpenRouterExplainer {
    api_key: Option<String>,
    model: Option<String>,
    base_url: String,
    key_source: Option<Arc<SupabaseClient>>,
    cached: Mutex<Option<Credentials>>,
    client: reqwest::Client,
}

impl OpenRouterExplainer {
    pub fn new(api_key: Option<String>, model: Option<String>, base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            key_source: None,
            cached: Mutex::new(None),
            client,
        }
    }

    /// Prefer the project's shared key from Supabase over the configured one.
    #[must_use]
    pub fn with_key_source(mut self, supabase: Arc<SupabaseClient>) -> Self {
        self.key_source = Some(supabase);
        self
    }

    async fn credentials(&self) -> Result<Credentials, ServiceError> {
        let mut cached = self.cached.lock().await;
        if let Some(creds) = cached.as_ref() {
            return Ok(creds.clone());
        }

        if let Some(source) = &self.key_source {
            match source.fetch_public_ai_key().await {
                Ok(Some(key)) => {
                    let creds = Credentials {
                        api_key: key.key,
                        model: sanitize_model(key.model.as_deref().or(self.model.as_deref())),
                    };
                    *cached = Some(creds.clone());
                    return Ok(creds);
                }
                Ok(None) => tracing::debug!("no shared AI key in Supabase"),
                Err(e) => tracing::warn!("failed to look up shared AI key: {e:#}"),
            }
        }

        self.api_key
            .clone()
            .map(|api_key| Credentials {
                api_key,
                model: sanitize_model(self.model.as_deref()),
            })
            .ok_or(ServiceError::MissingApiKey)
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ExplanationService for OpenRouterExplainer {
    fn name(&self) -> &str {
        "openrouter"
    }

    #[instrument(skip(self, request), fields(mode = %request.mode))]
    async fn explain(&self, request: &ExplainRequest) -> anyhow::Result<Explanation> {
        let start = Instant::now();
        let creds = self.credentials().await?;

        let body = ChatRequest {
            model: creds.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(request),
                },
            ],
            max_tokens: request.mode.max_tokens(),
            temperature: TEMPERATURE,
            top_p: TOP_P,
        };

        let response = self
            .client
            .post(format!("{}/api/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", creds.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, DEFAULT_TIMEOUT_SECS))?;

        let api_response: ChatResponse = json_body(check_status(response).await?).await?;

        let text = api_response
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .or(api_response.explanation)
            .unwrap_or_default();

        Ok(Explanation {
            text,
            model: api_response.model.or(Some(creds.model)),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
