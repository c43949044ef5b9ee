//! Reasoning-engine clients for LakeClaw.
//!
//! Two wire protocols cover every supported engine: OpenAI-style
//! `/chat/completions` (Databricks model serving, OpenAI, OpenRouter,
//! Ollama) and Anthropic's Messages API. The router picks one from config.

pub mod anthropic;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::ProviderRouter;

use lakeclaw_core::error::ProviderError;
use serde_json::Value;
use std::time::Duration;

/// Client-side cap on one engine request. The orchestrator applies its own
/// `engine_timeout` on top.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Used when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a transport failure from `reqwest` onto the provider error model.
pub(crate) fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else if e.is_decode() {
        ProviderError::MalformedResponse(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Read `Retry-After` as whole seconds.
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Classify a non-success engine response.
pub(crate) fn status_error(status: u16, retry_after_secs: Option<u64>, body: &str) -> ProviderError {
    let message = error_message(body);
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after_secs.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 | 403 => ProviderError::AuthenticationFailed(message),
        _ => ProviderError::ApiError {
            status_code: status,
            message,
        },
    }
}

/// Pull the human message out of an engine error body.
///
/// Databricks serving answers `{"error_code", "message"}`; OpenAI and
/// Anthropic nest it as `{"error": {"message"}}`. Anything else is kept raw.
fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };
    json.pointer("/error/message")
        .or_else(|| json.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| trimmed.to_string())
}
