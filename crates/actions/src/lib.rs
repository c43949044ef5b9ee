//! Built-in actions for LakeClaw.
//!
//! Workspace actions are thin declarations over [`rest::RestAction`]; each
//! module contributes a list. Session-context actions live in [`context`].

pub mod catalog;
pub mod client;
pub mod clusters;
pub mod context;
pub mod jobs;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod repos;
pub mod rest;
pub mod secrets;
pub mod sql;
pub mod workspace;

pub use client::{RestWorkspaceClient, UnconfiguredWorkspace, WorkspaceApi};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockWorkspaceApi;

use lakeclaw_core::action::{Action, ActionRegistry};
use lakeclaw_core::error::RegistryError;
use std::sync::Arc;

/// Every built-in action, remote ones bound to `api`.
pub fn all_actions(api: Arc<dyn WorkspaceApi>) -> Vec<Arc<dyn Action>> {
    let mut actions = context::actions();
    actions.extend(clusters::actions(&api));
    actions.extend(jobs::actions(&api));
    actions.extend(sql::actions(&api));
    actions.extend(catalog::actions(&api));
    actions.extend(workspace::actions(&api));
    actions.extend(repos::actions(&api));
    actions.extend(secrets::actions(&api));
    actions
}

/// A registry holding every built-in action.
pub fn default_registry(api: Arc<dyn WorkspaceApi>) -> Result<ActionRegistry, RegistryError> {
    let mut registry = ActionRegistry::new();
    registry.register_all(all_actions(api))?;
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use lakeclaw_core::action::ActionContext;
    use lakeclaw_core::error::ActionError;
    use lakeclaw_core::resolve::ContextResolver;
    use lakeclaw_core::session::{SessionField, SessionRecord, SessionStore};
    use lakeclaw_session::InMemorySessionStore;
    use serde_json::Value;

    pub fn session_with(field: SessionField, value: &str) -> SessionRecord {
        let mut record = SessionRecord::new("test");
        record.set_field(field, value);
        record
    }

    /// Resolve against `session` and execute one registered action.
    pub async fn run(
        api: Arc<MockWorkspaceApi>,
        name: &str,
        args: Value,
        session: Option<SessionRecord>,
    ) -> Result<Value, ActionError> {
        let registry = default_registry(api).expect("built-in actions register");
        let (descriptor, handler) = registry.lookup(name).expect("action exists");
        let session = session.unwrap_or_else(|| SessionRecord::new("test"));
        let args = args.as_object().cloned().unwrap_or_default();
        let call = ContextResolver::resolve(descriptor, &args, &session)?;
        let ctx = ActionContext::new("test", Arc::new(InMemorySessionStore::new()));
        handler.execute(&ctx, &call).await
    }

    /// Same, but against a live store so session actions see their writes.
    pub async fn run_with_store(
        store: Arc<InMemorySessionStore>,
        session_id: &str,
        name: &str,
        args: Value,
    ) -> Result<Value, ActionError> {
        let registry = default_registry(Arc::new(MockWorkspaceApi::new())).expect("built-in actions register");
        let (descriptor, handler) = registry.lookup(name).expect("action exists");
        let session = store.get(session_id).await;
        let args = args.as_object().cloned().unwrap_or_default();
        let call = ContextResolver::resolve(descriptor, &args, &session)?;
        let ctx = ActionContext::new(session_id, store);
        handler.execute(&ctx, &call).await
    }
}
