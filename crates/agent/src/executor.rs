//! The action executor.
//!
//! Takes an action name, raw arguments and a session id, resolves the
//! arguments against the session, runs the handler under a timeout and
//! shapes whatever happens into an [`ActionOutcome`]. Nothing escapes as a
//! raw error or a panic.

use futures::FutureExt;
use lakeclaw_config::AgentConfig;
use lakeclaw_core::action::{Action, ActionContext, ActionRegistry};
use lakeclaw_core::error::{ActionError, ErrorKind};
use lakeclaw_core::event::{DomainEvent, EventBus};
use lakeclaw_core::resolve::{ContextResolver, Provenance, ResolvedCall};
use lakeclaw_core::session::SessionStore;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The result of one executor call, success or classified failure.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action: String,

    /// Resolved arguments, or the raw arguments when resolution failed.
    pub arguments: Value,

    pub provenance: BTreeMap<String, Provenance>,

    pub result: Result<Value, ActionError>,

    /// 1, or 2 when a transient failure was retried.
    pub attempts: u32,

    pub duration_ms: u64,
}

impl ActionOutcome {
    /// An outcome for a call that never reached a handler.
    pub fn failed(action: impl Into<String>, arguments: Value, error: ActionError) -> Self {
        Self {
            action: action.into(),
            arguments,
            provenance: BTreeMap::new(),
            result: Err(error),
            attempts: 0,
            duration_ms: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&ActionError> {
        self.result.as_ref().err()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(|e| e.kind)
    }

    /// The envelope the engine sees as a tool result.
    pub fn envelope(&self) -> Value {
        match &self.result {
            Ok(output) => json!({
                "action": self.action,
                "arguments": self.arguments,
                "status": "ok",
                "output": output,
            }),
            Err(err) => json!({
                "action": self.action,
                "arguments": self.arguments,
                "status": "error",
                "error": {
                    "kind": err.kind,
                    "message": err.message,
                    "param": err.param,
                },
            }),
        }
    }

    pub fn to_tool_content(&self) -> String {
        self.envelope().to_string()
    }

    /// The envelope plus provenance and timing, for direct callers.
    pub fn to_json(&self) -> Value {
        let mut out = self.envelope();
        out["provenance"] = json!(self.provenance);
        out["attempts"] = json!(self.attempts);
        out["duration_ms"] = json!(self.duration_ms);
        out
    }
}

/// Runs registered actions on behalf of a session.
pub struct ActionExecutor {
    registry: Arc<ActionRegistry>,
    sessions: Arc<dyn SessionStore>,
    events: Option<Arc<EventBus>>,
    action_timeout: Duration,
    retry_backoff: Duration,
}

impl ActionExecutor {
    pub fn new(registry: Arc<ActionRegistry>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            registry,
            sessions,
            events: None,
            action_timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Timeout and backoff from the `[agent]` config section.
    pub fn from_config(
        registry: Arc<ActionRegistry>,
        sessions: Arc<dyn SessionStore>,
        config: &AgentConfig,
    ) -> Self {
        Self::new(registry, sessions)
            .with_action_timeout(config.action_timeout())
            .with_retry_backoff(config.retry_backoff())
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Resolve and run `name` for `session_id`. Never fails; failures are
    /// carried in the outcome.
    pub async fn execute(&self, session_id: &str, name: &str, arguments: Value) -> ActionOutcome {
        let started = Instant::now();

        let Some((descriptor, handler)) = self.registry.lookup(name) else {
            let err = ActionError::not_found(format!("unknown action '{name}'"));
            return self.finish(session_id, ActionOutcome::failed(name, arguments, err), started);
        };

        let explicit = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let err = ActionError::validation(format!(
                    "arguments for '{name}' must be a JSON object"
                ));
                return self.finish(session_id, ActionOutcome::failed(name, other, err), started);
            }
        };

        let session = self.sessions.get(session_id).await;
        let call = match ContextResolver::resolve(descriptor, &explicit, &session) {
            Ok(call) => call,
            Err(err) => {
                let outcome = ActionOutcome::failed(name, Value::Object(explicit), err);
                return self.finish(session_id, outcome, started);
            }
        };

        let ctx = ActionContext::new(session_id, self.sessions.clone());
        let mut attempts = 1;
        let mut result = self.invoke(handler.as_ref(), &ctx, &call).await;

        if let Err(err) = &result {
            if err.is_retryable() && descriptor.side_effect.is_idempotent() {
                debug!(
                    session_id,
                    action = name,
                    backoff_ms = self.retry_backoff.as_millis() as u64,
                    "Retrying after transient failure: {}",
                    err.message
                );
                tokio::time::sleep(self.retry_backoff).await;
                attempts = 2;
                result = self.invoke(handler.as_ref(), &ctx, &call).await;
            }
        }

        let outcome = ActionOutcome {
            action: call.action,
            arguments: call.arguments,
            provenance: call.provenance,
            result,
            attempts,
            duration_ms: 0,
        };
        self.finish(session_id, outcome, started)
    }

    async fn invoke(
        &self,
        handler: &dyn Action,
        ctx: &ActionContext,
        call: &ResolvedCall,
    ) -> Result<Value, ActionError> {
        let run = AssertUnwindSafe(handler.execute(ctx, call)).catch_unwind();
        match tokio::time::timeout(self.action_timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ActionError::internal(format!(
                "action '{}' panicked: {}",
                call.action,
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(ActionError::unavailable(format!(
                "action '{}' timed out after {:?}",
                call.action, self.action_timeout
            ))),
        }
    }

    fn finish(&self, session_id: &str, mut outcome: ActionOutcome, started: Instant) -> ActionOutcome {
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        let action = outcome.action.as_str();
        let attempts = outcome.attempts;
        let duration_ms = outcome.duration_ms;

        match &outcome.result {
            Ok(_) => info!(session_id, action, attempts, duration_ms, "Action executed"),
            Err(err) => match err.kind {
                ErrorKind::Internal => error!(
                    session_id,
                    action,
                    arguments = %outcome.arguments,
                    attempts,
                    duration_ms,
                    "Action failed with internal error: {}",
                    err.message
                ),
                ErrorKind::RemoteUnavailable | ErrorKind::RemoteRejected => warn!(
                    session_id,
                    action,
                    kind = %err.kind,
                    attempts,
                    duration_ms,
                    "Action failed: {}",
                    err.message
                ),
                ErrorKind::Validation | ErrorKind::NotFound => debug!(
                    session_id,
                    action,
                    kind = %err.kind,
                    param = ?err.param,
                    "Action refused: {}",
                    err.message
                ),
            },
        }

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ActionExecuted {
                session_id: session_id.to_string(),
                action: outcome.action.clone(),
                error_kind: outcome.error_kind(),
                attempts,
                duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }

        outcome
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lakeclaw_actions::MockWorkspaceApi;
    use lakeclaw_core::action::{ParamSpec, SideEffect};
    use lakeclaw_core::session::SessionField;
    use lakeclaw_session::InMemorySessionStore;

    enum Behavior {
        Echo,
        Sleep(Duration),
        Panic,
    }

    struct StubAction {
        name: &'static str,
        behavior: Behavior,
    }

    #[async_trait]
    impl Action for StubAction {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Stub"
        }
        fn params(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::string("cluster_id", "Cluster").bind(SessionField::CurrentClusterId)]
        }
        fn side_effect(&self) -> SideEffect {
            SideEffect::ReadOnly
        }
        async fn execute(&self, _ctx: &ActionContext, call: &ResolvedCall) -> Result<Value, ActionError> {
            match self.behavior {
                Behavior::Echo => Ok(call.arguments.clone()),
                Behavior::Sleep(d) => {
                    tokio::time::sleep(d).await;
                    Ok(Value::Null)
                }
                Behavior::Panic => panic!("handler bug"),
            }
        }
    }

    fn stub_executor() -> ActionExecutor {
        let mut registry = ActionRegistry::new();
        registry
            .register_all([
                Arc::new(StubAction { name: "echo", behavior: Behavior::Echo }) as Arc<dyn Action>,
                Arc::new(StubAction { name: "slow", behavior: Behavior::Sleep(Duration::from_secs(30)) }),
                Arc::new(StubAction { name: "boom", behavior: Behavior::Panic }),
            ])
            .unwrap();
        ActionExecutor::new(Arc::new(registry), Arc::new(InMemorySessionStore::new()))
            .with_retry_backoff(Duration::ZERO)
    }

    fn workspace_executor(mock: Arc<MockWorkspaceApi>, store: Arc<InMemorySessionStore>) -> ActionExecutor {
        let registry = lakeclaw_actions::default_registry(mock).unwrap();
        ActionExecutor::new(Arc::new(registry), store).with_retry_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn unknown_action_is_not_found() {
        let outcome = stub_executor().execute("s", "nope", json!({})).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn non_object_arguments_are_validation() {
        let outcome = stub_executor().execute("s", "echo", json!([1, 2])).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Validation));
        assert_eq!(outcome.arguments, json!([1, 2]));
    }

    #[tokio::test]
    async fn null_arguments_mean_none() {
        let outcome = stub_executor().execute("s", "echo", Value::Null).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn session_default_fills_then_explicit_overrides() {
        let mock = Arc::new(MockWorkspaceApi::new());
        let store = Arc::new(InMemorySessionStore::new());
        store.update("S1", SessionField::CurrentClusterId, "c-42".into()).await;
        let executor = workspace_executor(mock.clone(), store.clone());

        let defaulted = executor.execute("S1", "get_cluster", json!({})).await;
        assert_eq!(defaulted.arguments["cluster_id"], "c-42");
        assert_eq!(defaulted.provenance["cluster_id"], Provenance::Session);

        let overridden = executor
            .execute("S1", "get_cluster", json!({"cluster_id": "c-99"}))
            .await;
        assert_eq!(overridden.arguments["cluster_id"], "c-99");
        assert_eq!(overridden.provenance["cluster_id"], Provenance::Explicit);

        assert_eq!(
            store.snapshot("S1").await.current_cluster_id.as_deref(),
            Some("c-42")
        );
        assert_eq!(mock.calls()[1].query, vec![("cluster_id".to_string(), "c-99".to_string())]);
    }

    #[tokio::test]
    async fn missing_required_never_reaches_handler() {
        let mock = Arc::new(MockWorkspaceApi::new());
        let executor = workspace_executor(mock.clone(), Arc::new(InMemorySessionStore::new()));
        let outcome = executor.execute("S2", "start_cluster", json!({})).await;
        let err = outcome.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.param.as_deref(), Some("cluster_id"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn read_only_retried_once_on_unavailable() {
        let mock = Arc::new(MockWorkspaceApi::new());
        mock.fail_once("/api/2.0/clusters/get", ActionError::unavailable("503"));
        mock.respond("/api/2.0/clusters/get", json!({"cluster_id": "c-1", "state": "RUNNING"}));
        let executor = workspace_executor(mock.clone(), Arc::new(InMemorySessionStore::new()));

        let outcome = executor.execute("s", "get_cluster", json!({"cluster_id": "c-1"})).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(mock.call_count("/api/2.0/clusters/get"), 2);
    }

    #[tokio::test]
    async fn mutating_not_retried() {
        let mock = Arc::new(MockWorkspaceApi::new());
        mock.fail_once("/api/2.0/clusters/start", ActionError::unavailable("connection reset"));
        let executor = workspace_executor(mock.clone(), Arc::new(InMemorySessionStore::new()));

        let outcome = executor.execute("s", "start_cluster", json!({"cluster_id": "c-1"})).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RemoteUnavailable));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(mock.call_count("/api/2.0/clusters/start"), 1);
    }

    #[tokio::test]
    async fn rejected_not_retried_and_kept_verbatim() {
        let mock = Arc::new(MockWorkspaceApi::new());
        mock.fail("/api/2.0/clusters/get", ActionError::rejected("PERMISSION_DENIED: no access"));
        let executor = workspace_executor(mock.clone(), Arc::new(InMemorySessionStore::new()));

        let outcome = executor.execute("s", "get_cluster", json!({"cluster_id": "c-1"})).await;
        let err = outcome.error().unwrap();
        assert_eq!(err.kind, ErrorKind::RemoteRejected);
        assert_eq!(err.message, "PERMISSION_DENIED: no access");
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_remote_unavailable() {
        let executor = stub_executor().with_action_timeout(Duration::from_millis(50));
        let outcome = executor.execute("s", "slow", json!({})).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RemoteUnavailable));
        // read-only, so the timeout was retried
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn panic_is_internal() {
        let outcome = stub_executor().execute("s", "boom", json!({})).await;
        let err = outcome.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.contains("handler bug"));
    }

    #[tokio::test]
    async fn envelope_shapes() {
        let executor = stub_executor();
        let ok = executor.execute("s", "echo", json!({"cluster_id": "c-1"})).await;
        assert_eq!(
            ok.envelope(),
            json!({
                "action": "echo",
                "arguments": {"cluster_id": "c-1"},
                "status": "ok",
                "output": {"cluster_id": "c-1"},
            })
        );

        let bad = executor.execute("s", "echo", json!({"bogus": 1})).await;
        let env = bad.envelope();
        assert_eq!(env["status"], "error");
        assert_eq!(env["error"]["kind"], "validation");
        assert_eq!(env["error"]["param"], "bogus");
    }

    #[tokio::test]
    async fn publishes_action_executed() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let executor = stub_executor().with_event_bus(bus);
        executor.execute("s9", "nope", json!({})).await;

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ActionExecuted { session_id, action, error_kind, .. } => {
                assert_eq!(session_id, "s9");
                assert_eq!(action, "nope");
                assert_eq!(*error_kind, Some(ErrorKind::NotFound));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
