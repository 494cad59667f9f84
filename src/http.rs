//! HTTP utilities for embedding APIs and dataset downloads

use std::time::Duration;

use reqwest::{Client, Response};

/// Create a reqwest client with connection pooling and sensible defaults
///
/// Timeouts are generous: a single embedding batch against a cold local
/// server can take minutes.
pub fn create_client() -> Client {
    Client::builder()
        .user_agent(concat!("mteb-rs/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(300))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client")
}

/// Check HTTP response status and return detailed error if not successful
pub async fn check_response(response: Response, service_name: &str) -> anyhow::Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    anyhow::bail!("{} API error {}: {}", service_name, status, error_detail(&body))
}

/// Pull the human-readable message out of the common API error bodies
fn error_detail(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };

    json.get("error")
        .and_then(|e| e.get("message").and_then(|m| m.as_str()).or_else(|| e.as_str()))
        .or_else(|| json.get("message").and_then(|m| m.as_str()))
        .or_else(|| json.get("detail").and_then(|d| d.as_str()))
        .map(|s| s.to_string())
        .unwrap_or_else(|| body.to_string())
}
