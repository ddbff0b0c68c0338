//! Shared HTTP plumbing for the hosted model APIs.
//!
//! Both the chat-completions client ([`crate::llm`]) and the embeddings
//! provider ([`crate::embedding`]) post JSON to an OpenAI-compatible endpoint
//! with the same retry strategy:
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use crate::error::{DiveLogError, DiveResult};

/// Build a client whose requests time out after `timeout_secs`.
pub fn build_client(timeout_secs: u64) -> DiveResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DiveLogError::upstream(format!("failed to build HTTP client: {}", e)))
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// Whether a response status is worth retrying.
pub fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// POST `body` as JSON with bearer auth and retry/backoff, returning the
/// decoded JSON response.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
    max_retries: u32,
) -> DiveResult<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::debug!(url, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        DiveLogError::upstream(format!("invalid JSON response from {}: {}", url, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();

                if is_retryable(status) {
                    tracing::warn!(url, %status, "transient API error");
                    last_err = Some(DiveLogError::upstream(format!(
                        "API error {}: {}",
                        status, body_text
                    )));
                    continue;
                }

                return Err(DiveLogError::upstream(format!(
                    "API error {}: {}",
                    status, body_text
                )));
            }
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("request to {} timed out", url)
                } else {
                    format!("request to {} failed: {}", url, e)
                };
                tracing::warn!(url, error = %e, "request failed");
                last_err = Some(DiveLogError::upstream(message));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| DiveLogError::upstream("request failed after retries")))
}
