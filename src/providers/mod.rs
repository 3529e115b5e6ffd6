pub mod base;
pub mod image_parser;
pub mod transcription;

pub use base::{ImageDescriber, Transcriber};
pub use image_parser::VllmImageParser;
pub use transcription::GroqTranscriptionProvider;

use crate::errors::NanobotError;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Connect timeout for provider HTTP clients (seconds).
pub(crate) const PROVIDER_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Build a `reqwest::Client` with the standard connect timeout and the given overall timeout.
pub(crate) fn provider_http_client(request_timeout_secs: u64) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(PROVIDER_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Turn a provider HTTP response into JSON, mapping error statuses and
/// `{"error": ...}` bodies to `NanobotError::Provider`.
pub(crate) async fn check_response(
    resp: reqwest::Response,
    provider: &str,
) -> Result<Value, NanobotError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(NanobotError::Provider {
            message: format!(
                "{} API returned {}: {}",
                provider,
                status.as_u16(),
                crate::utils::preview(&body, 200)
            ),
            retryable: status.as_u16() == 429 || status.is_server_error(),
        });
    }

    let json: Value = resp.json().await.map_err(|e| NanobotError::Provider {
        message: format!("Failed to parse {} API response: {}", provider, e),
        retryable: false,
    })?;
    if let Some(error_val) = json.get("error") {
        return Err(NanobotError::Provider {
            message: format!("{} API error: {}", provider, error_val),
            retryable: false,
        });
    }
    Ok(json)
}

/// Whether a provider failure is transient (rate limit, server error, timeout).
pub(crate) fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<NanobotError>()
        .is_some_and(NanobotError::is_retryable)
        || err
            .downcast_ref::<reqwest::Error>()
            .is_some_and(|e| e.is_timeout() || e.is_connect())
}
