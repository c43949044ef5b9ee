//! Workspace REST client.
//!
//! `WorkspaceApi` is the seam between action handlers and the remote
//! workspace. Every failure leaving it is already an `ActionError` with a
//! kind, so handlers just propagate with `?`.

use async_trait::async_trait;
use lakeclaw_core::error::ActionError;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Minimal verb set the workspace actions need.
#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    /// `GET {host}{path}?{query}`
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ActionError>;

    /// `POST {host}{path}` with a JSON body.
    async fn post(&self, path: &str, body: Value) -> Result<Value, ActionError>;
}

/// Bearer-token client for the workspace REST API.
pub struct RestWorkspaceClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl RestWorkspaceClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }

    /// Build from the `[workspace]` config section. `None` if host or token
    /// is missing.
    pub fn from_config(config: &lakeclaw_config::WorkspaceConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        let base_url = config.base_url()?;
        let token = config.token.clone()?;
        Some(Self::new(base_url, token, config.request_timeout()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn finish(&self, path: &str, response: reqwest::Response) -> Result<Value, ActionError> {
        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            let err = classify_status(status, &text);
            warn!(path, status, kind = %err.kind, "Workspace API error");
            return Err(err);
        }

        debug!(path, status, bytes = text.len(), "Workspace API response");
        decode_body(&text)
    }
}

#[async_trait]
impl WorkspaceApi for RestWorkspaceClient {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ActionError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        self.finish(path, response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ActionError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        self.finish(path, response).await
    }
}

/// Stand-in used when only the catalog is needed (listing actions without
/// workspace credentials). Every call is rejected.
pub struct UnconfiguredWorkspace;

#[async_trait]
impl WorkspaceApi for UnconfiguredWorkspace {
    async fn get(&self, path: &str, _query: &[(String, String)]) -> Result<Value, ActionError> {
        Err(ActionError::rejected(format!("workspace is not configured (GET {path})")))
    }

    async fn post(&self, path: &str, _body: Value) -> Result<Value, ActionError> {
        Err(ActionError::rejected(format!("workspace is not configured (POST {path})")))
    }
}

/// Error envelope the workspace API returns on failure.
#[derive(Debug, Default, Deserialize)]
struct RemoteError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Classify a non-2xx response.
///
/// The remote `error_code` wins over the HTTP status where both speak;
/// the remote message is kept verbatim.
pub fn classify_status(status: u16, body: &str) -> ActionError {
    let remote: RemoteError = serde_json::from_str(body).unwrap_or_default();
    let message = remote
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("workspace API returned HTTP {status}")
            } else {
                trimmed.to_string()
            }
        });

    match remote.error_code.as_deref() {
        Some("RESOURCE_DOES_NOT_EXIST") | Some("NOT_FOUND") => {
            return ActionError::not_found(message);
        }
        Some("INVALID_PARAMETER_VALUE") | Some("MALFORMED_REQUEST") => {
            return ActionError::validation(message);
        }
        Some("TEMPORARILY_UNAVAILABLE") | Some("REQUEST_LIMIT_EXCEEDED") => {
            return ActionError::unavailable(message);
        }
        _ => {}
    }

    match status {
        429 | 500..=599 => ActionError::unavailable(message),
        404 => ActionError::not_found(message),
        400 => ActionError::validation(message),
        _ => ActionError::rejected(message),
    }
}

/// Decode a success body. Mutations answer with an empty body or `{}`.
fn decode_body(text: &str) -> Result<Value, ActionError> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(text)
        .map_err(|e| ActionError::internal(format!("undecodable workspace response: {e}")))
}

fn transport_error(e: reqwest::Error) -> ActionError {
    if e.is_timeout() {
        ActionError::unavailable(format!("workspace request timed out: {e}"))
    } else if e.is_connect() || e.is_request() || e.is_body() {
        ActionError::unavailable(format!("workspace unreachable: {e}"))
    } else if e.is_decode() {
        ActionError::internal(format!("undecodable workspace response: {e}"))
    } else {
        ActionError::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeclaw_core::error::ErrorKind;

    #[test]
    fn server_errors_are_unavailable() {
        assert_eq!(classify_status(503, "").kind, ErrorKind::RemoteUnavailable);
        assert_eq!(classify_status(429, "slow down").kind, ErrorKind::RemoteUnavailable);
    }

    #[test]
    fn missing_resource_is_not_found() {
        let body = r#"{"error_code":"RESOURCE_DOES_NOT_EXIST","message":"Cluster c-9 does not exist"}"#;
        let err = classify_status(400, body);
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "Cluster c-9 does not exist");
        assert_eq!(classify_status(404, "").kind, ErrorKind::NotFound);
    }

    #[test]
    fn bad_parameter_is_validation() {
        let body = r#"{"error_code":"INVALID_PARAMETER_VALUE","message":"bad id"}"#;
        assert_eq!(classify_status(400, body).kind, ErrorKind::Validation);
        assert_eq!(classify_status(400, "nope").kind, ErrorKind::Validation);
    }

    #[test]
    fn permission_denied_is_rejected_verbatim() {
        let body = r#"{"error_code":"PERMISSION_DENIED","message":"User lacks CAN_RESTART on cluster"}"#;
        let err = classify_status(403, body);
        assert_eq!(err.kind, ErrorKind::RemoteRejected);
        assert_eq!(err.message, "User lacks CAN_RESTART on cluster");
        assert_eq!(classify_status(409, "").kind, ErrorKind::RemoteRejected);
    }

    #[test]
    fn plain_text_body_becomes_message() {
        let err = classify_status(401, "  Invalid access token  ");
        assert_eq!(err.kind, ErrorKind::RemoteRejected);
        assert_eq!(err.message, "Invalid access token");
    }

    #[test]
    fn empty_success_body_is_empty_object() {
        assert_eq!(decode_body("").unwrap(), serde_json::json!({}));
        assert_eq!(decode_body("{\"a\":1}").unwrap()["a"], 1);
    }

    #[test]
    fn garbage_success_body_is_internal() {
        assert_eq!(decode_body("<html>").unwrap_err().kind, ErrorKind::Internal);
    }

    #[test]
    fn from_config_requires_host_and_token() {
        let mut cfg = lakeclaw_config::WorkspaceConfig::default();
        assert!(RestWorkspaceClient::from_config(&cfg).is_none());
        cfg.host = Some("dbc-1.cloud.databricks.com/".into());
        cfg.token = Some("dapi".into());
        let client = RestWorkspaceClient::from_config(&cfg).unwrap();
        assert_eq!(client.base_url(), "https://dbc-1.cloud.databricks.com");
    }

    #[tokio::test]
    async fn unconfigured_workspace_rejects() {
        let err = UnconfiguredWorkspace.get("/api/2.0/clusters/list", &[]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemoteRejected);
        assert!(err.message.contains("not configured"));
    }
}
