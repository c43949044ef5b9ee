//! Session context: the defaults a caller's session remembers between requests.
//!
//! A session is keyed by an opaque caller-supplied identifier. Its record holds
//! the "current" workspace path, cluster, job and warehouse, which the context
//! resolver substitutes for arguments the caller leaves out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the mutable default fields of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionField {
    WorkspacePath,
    CurrentClusterId,
    CurrentJobId,
    CurrentWarehouseId,
}

impl SessionField {
    pub const ALL: [SessionField; 4] = [
        SessionField::WorkspacePath,
        SessionField::CurrentClusterId,
        SessionField::CurrentJobId,
        SessionField::CurrentWarehouseId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkspacePath => "workspace_path",
            Self::CurrentClusterId => "current_cluster_id",
            Self::CurrentJobId => "current_job_id",
            Self::CurrentWarehouseId => "current_warehouse_id",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl std::fmt::Display for SessionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stored state of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,

    #[serde(default)]
    pub workspace_path: Option<String>,

    #[serde(default)]
    pub current_cluster_id: Option<String>,

    #[serde(default)]
    pub current_job_id: Option<String>,

    #[serde(default)]
    pub current_warehouse_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub last_accessed: DateTime<Utc>,
}

impl SessionRecord {
    /// A default-valued record, as created on first reference.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            workspace_path: None,
            current_cluster_id: None,
            current_job_id: None,
            current_warehouse_id: None,
            created_at: now,
            last_accessed: now,
        }
    }

    pub fn field(&self, field: SessionField) -> Option<&str> {
        match field {
            SessionField::WorkspacePath => self.workspace_path.as_deref(),
            SessionField::CurrentClusterId => self.current_cluster_id.as_deref(),
            SessionField::CurrentJobId => self.current_job_id.as_deref(),
            SessionField::CurrentWarehouseId => self.current_warehouse_id.as_deref(),
        }
    }

    /// Set one field. Only stores call this; everyone else goes through
    /// [`SessionStore::update`].
    pub fn set_field(&mut self, field: SessionField, value: impl Into<String>) {
        *self.slot(field) = Some(value.into());
    }

    /// Back to "no default" for one field.
    pub fn unset_field(&mut self, field: SessionField) {
        *self.slot(field) = None;
    }

    fn slot(&mut self, field: SessionField) -> &mut Option<String> {
        match field {
            SessionField::WorkspacePath => &mut self.workspace_path,
            SessionField::CurrentClusterId => &mut self.current_cluster_id,
            SessionField::CurrentJobId => &mut self.current_job_id,
            SessionField::CurrentWarehouseId => &mut self.current_warehouse_id,
        }
    }
}

/// Keyed container of session records.
///
/// Implementations must be safe for concurrent callers on different and on
/// the same session id. Concurrent `update`s of the same field are
/// last-write-wins. No field validation happens here.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session, creating a default record on first reference.
    /// Counts as activity for eviction purposes.
    async fn get(&self, session_id: &str) -> SessionRecord;

    /// Set one field of a session, creating the session if needed.
    async fn update(&self, session_id: &str, field: SessionField, value: String);

    /// Remove one field's default, leaving the others. Unsetting a field of
    /// an unknown session creates it.
    async fn unset(&self, session_id: &str, field: SessionField);

    /// Forget a session entirely. Clearing an unknown session is a no-op.
    async fn clear(&self, session_id: &str);

    /// Read-only copy for display. Does not count as activity, so repeated
    /// snapshots with no intervening write are identical.
    async fn snapshot(&self, session_id: &str) -> SessionRecord;
}
