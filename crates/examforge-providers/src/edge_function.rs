//! Supabase edge-function explainer (`/functions/v1/ai-explain`).
//!
//! The function holds the OpenRouter key server-side, so the client only
//! sends the question context. Follow-ups and the explanation mode are not
//! part of the function's contract and are dropped.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use examforge_core::error::ServiceError;
use examforge_core::traits::{ExplainRequest, Explanation, ExplanationService};

use crate::error::{json_body, send_error};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const FUNCTION_PATH: &str = "/functions/v1/ai-explain";

/// Explanation service backed by a Supabase edge function.
pub struct EdgeFunctionExplainer {
    endpoint: String,
    anon_key: String,
    client: reqwest::Client,
}

impl EdgeFunctionExplainer {
    /// `base_url` is the Supabase project URL; an explicit endpoint overrides it.
    pub fn new(base_url: &str, anon_key: &str, endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.unwrap_or_else(|| {
                format!("{}{FUNCTION_PATH}", base_url.trim_end_matches('/'))
            }),
            anon_key: anon_key.to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionRequest<'a> {
    question: &'a str,
    answers: &'a [String],
    correct_index: usize,
}

#[derive(Deserialize)]
struct FunctionResponse {
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ExplanationService for EdgeFunctionExplainer {
    fn name(&self) -> &str {
        "edge-function"
    }

    #[instrument(skip(self, request))]
    async fn explain(&self, request: &ExplainRequest) -> anyhow::Result<Explanation> {
        let start = Instant::now();
        if request.follow_up.is_some() {
            tracing::debug!("edge function ignores follow-up text");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .json(&FunctionRequest {
                question: &request.stem,
                answers: &request.answers,
                correct_index: request.correct_index,
            })
            .send()
            .await
            .map_err(|e| send_error(e, DEFAULT_TIMEOUT_SECS))?;

        // Errors come back as `{ "error": ... }` with a 4xx/5xx status.
        let status = response.status().as_u16();
        let body: FunctionResponse = json_body(response).await?;
        if let Some(message) = body.error {
            return Err(ServiceError::ApiError { status, message }.into());
        }
        if status >= 400 {
            return Err(ServiceError::ApiError {
                status,
                message: "edge function failed".into(),
            }
            .into());
        }

        Ok(Explanation {
            text: body.explanation.unwrap_or_default(),
            model: None,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examforge_core::explain::ExplainMode;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ExplainRequest {
        ExplainRequest {
            stem: "First-line for angina?".into(),
            answers: vec!["Beta blocker".into(), "Digoxin".into()],
            correct_index: 0,
            follow_up: None,
            mode: ExplainMode::Concise,
        }
    }

    #[tokio::test]
    async fn posts_question_context() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(FUNCTION_PATH))
            .and(header("apikey", "anon"))
            .and(body_json(serde_json::json!({
                "question": "First-line for angina?",
                "answers": ["Beta blocker", "Digoxin"],
                "correctIndex": 0
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"explanation": "Reduces demand."})),
            )
            .mount(&server)
            .await;

        let explainer = EdgeFunctionExplainer::new(&server.uri(), "anon", None);
        let explanation = explainer.explain(&request()).await.unwrap();
        assert_eq!(explanation.text, "Reduces demand.");
    }

    #[tokio::test]
    async fn error_body_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(FUNCTION_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "Server misconfigured: missing OPENROUTER_API_KEY"
            })))
            .mount(&server)
            .await;

        let explainer = EdgeFunctionExplainer::new(&server.uri(), "anon", None);
        let err = explainer.explain(&request()).await.unwrap_err();
        assert!(err.to_string().contains("missing OPENROUTER_API_KEY"));
        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::ApiError { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn explicit_endpoint_overrides_base() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/custom/explain"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"explanation": "x"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let explainer = EdgeFunctionExplainer::new(
            "https://unused.example",
            "anon",
            Some(format!("{}/custom/explain", server.uri())),
        );
        explainer.explain(&request()).await.unwrap();
    }
}
