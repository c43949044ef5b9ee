//! Error types for the LakeClaw domain.
//!
//! Engine faults end a conversation; action failures never do, so the two
//! live in separate types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Faults reaching the reasoning engine. Any of these ends a conversation.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Classification attached to every failed action outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Malformed or missing argument. Never retried.
    Validation,
    /// Unknown action or unknown remote entity. Never retried.
    NotFound,
    /// Timeout or transient network failure. Retried once where safe.
    RemoteUnavailable,
    /// The remote system explicitly denied the operation. Never retried.
    RemoteRejected,
    /// A defect in the core itself.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not-found",
            Self::RemoteUnavailable => "remote-unavailable",
            Self::RemoteRejected => "remote-rejected",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified action failure.
///
/// Every failure the executor hands back is one of these; nothing lower-level
/// escapes unshaped.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,

    /// The parameter at fault, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            param: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// A validation failure naming the offending parameter.
    pub fn invalid_param(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
            param: Some(param.into()),
        }
    }

    /// A required parameter absent from both the request and the session.
    pub fn missing_param(param: &str) -> Self {
        Self::invalid_param(
            param,
            format!("missing required parameter '{param}' (not supplied and no session default)"),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteUnavailable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteRejected, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::RemoteUnavailable
    }
}

/// Construction-time failures when registering an action.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Action already registered: {0}")]
    DuplicateAction(String),

    #[error("Action {action} declares parameter '{param}' twice")]
    DuplicateParam { action: String, param: String },

    #[error("Action {action}: parameter '{param}' {reason}")]
    InvalidParam {
        action: String,
        param: String,
        reason: String,
    },
}
