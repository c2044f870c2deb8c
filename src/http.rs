//! JSON-over-HTTP calls to the embedding and LLM services, with retry.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;
use tracing::warn;

/// Build a client with the given request timeout.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Read an API key from the environment. Empty values count as unset.
pub fn api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// A POST target: where to send, how to authenticate, and what to call
/// the service in error messages.
pub struct Endpoint<'a> {
    pub service: &'a str,
    pub url: String,
    pub bearer: Option<&'a str>,
}

/// POST `body` as JSON and return the parsed JSON response, retrying
/// transient failures up to `max_retries` times.
pub async fn post_json(
    client: &reqwest::Client,
    endpoint: &Endpoint<'_>,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            warn!(
                service = endpoint.service,
                attempt,
                delay_secs = delay.as_secs(),
                error = %last_err.as_ref().map(|e: &anyhow::Error| e.to_string()).unwrap_or_default(),
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = endpoint.bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error - retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!(
                        "{} API error {}: {}",
                        endpoint.service,
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429) - don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", endpoint.service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!(
                    "{} connection error ({}): {}",
                    endpoint.service,
                    endpoint.url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", endpoint.service)))
}

/// Join a base URL and a path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
