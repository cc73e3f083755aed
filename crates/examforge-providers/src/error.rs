//! HTTP error classification shared by the remote clients.

use examforge_core::error::ServiceError;

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Map a transport failure to a `ServiceError`.
pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout(timeout_secs)
    } else {
        ServiceError::NetworkError(e.to_string())
    }
}

/// Turn a non-success response into a `ServiceError`, passing 2xx through.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status().as_u16();
    if status == 429 {
        let header = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok());
        return Err(ServiceError::RateLimited {
            retry_after_ms: retry_after_ms(header),
        });
    }
    if status == 401 || status == 403 {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::AuthenticationFailed(body));
    }
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::ApiError {
            status,
            message: body,
        });
    }
    Ok(response)
}

/// `Retry-After` seconds as milliseconds, defaulting to 5 s.
fn retry_after_ms(header: Option<&str>) -> u64 {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
        .saturating_mul(1000)
}

/// Decode a JSON body, reporting malformed payloads as an API error.
pub(crate) async fn json_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    response.json().await.map_err(|e| ServiceError::ApiError {
        status: 0,
        message: format!("failed to parse response: {e}"),
    })
}
