//! Session-context actions.
//!
//! These read or change only the caller's session record. They go through
//! the same registry and executor as the remote actions, so the engine can
//! inspect and steer its own defaults.

use async_trait::async_trait;
use lakeclaw_core::action::{Action, ActionContext, ParamSpec, SideEffect};
use lakeclaw_core::error::ActionError;
use lakeclaw_core::resolve::ResolvedCall;
use lakeclaw_core::session::{SessionField, SessionRecord};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Render a session record for the engine: the four defaults keyed by name.
pub fn session_json(record: &SessionRecord) -> Value {
    let mut out = Map::new();
    out.insert("session_id".into(), Value::String(record.session_id.clone()));
    for field in SessionField::ALL {
        out.insert(
            field.as_str().into(),
            record
                .field(field)
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

struct GetSessionContext;

#[async_trait]
impl Action for GetSessionContext {
    fn name(&self) -> &str {
        "get_session_context"
    }

    fn description(&self) -> &str {
        "Show the session's current workspace path, cluster, job and warehouse."
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Session
    }

    async fn execute(&self, ctx: &ActionContext, _call: &ResolvedCall) -> Result<Value, ActionError> {
        let record = ctx.sessions.snapshot(&ctx.session_id).await;
        Ok(session_json(&record))
    }
}

/// Sets one session default from one required parameter.
struct SetSessionField {
    name: &'static str,
    description: &'static str,
    field: SessionField,
    param: ParamSpec,
}

#[async_trait]
impl Action for SetSessionField {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![self.param.clone()]
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Session
    }

    async fn execute(&self, ctx: &ActionContext, call: &ResolvedCall) -> Result<Value, ActionError> {
        let value = match call.get(&self.param.name) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ActionError::missing_param(&self.param.name)),
        };
        if value.is_empty() {
            return Err(ActionError::invalid_param(
                &self.param.name,
                format!("'{}' must not be empty", self.param.name),
            ));
        }
        if self.field == SessionField::WorkspacePath && !value.starts_with('/') {
            return Err(ActionError::invalid_param(
                &self.param.name,
                format!("workspace path '{value}' must be absolute when no workspace path is set"),
            ));
        }

        ctx.sessions
            .update(&ctx.session_id, self.field, value.clone())
            .await;
        let record = ctx.sessions.snapshot(&ctx.session_id).await;
        Ok(json!({
            "status": "ok",
            "updated": self.field.as_str(),
            "value": value,
            "session": session_json(&record),
        }))
    }
}

struct ClearSessionContext;

#[async_trait]
impl Action for ClearSessionContext {
    fn name(&self) -> &str {
        "clear_session_context"
    }

    fn description(&self) -> &str {
        "Forget the session's workspace path, cluster, job and warehouse, or only the one named by field."
    }

    fn params(&self) -> Vec<ParamSpec> {
        let names: Vec<&str> = SessionField::ALL.iter().map(|f| f.as_str()).collect();
        vec![ParamSpec::string("field", "Forget only this default and keep the others.").one_of(&names)]
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Session
    }

    async fn execute(&self, ctx: &ActionContext, call: &ResolvedCall) -> Result<Value, ActionError> {
        let Some(name) = call.str("field") else {
            ctx.sessions.clear(&ctx.session_id).await;
            return Ok(json!({"status": "cleared", "session_id": ctx.session_id}));
        };
        let field = SessionField::from_name(name)
            .ok_or_else(|| ActionError::invalid_param("field", format!("unknown session field '{name}'")))?;
        ctx.sessions.unset(&ctx.session_id, field).await;
        let record = ctx.sessions.snapshot(&ctx.session_id).await;
        Ok(json!({
            "status": "cleared",
            "cleared": field.as_str(),
            "session": session_json(&record),
        }))
    }
}

pub fn actions() -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(GetSessionContext),
        Arc::new(SetSessionField {
            name: "set_workspace_path",
            description: "Set the session's working folder. Relative paths in later calls resolve against it.",
            field: SessionField::WorkspacePath,
            param: ParamSpec::string("path", "Folder path; relative paths resolve against the current one.")
                .required()
                .workspace_relative(),
        }),
        Arc::new(SetSessionField {
            name: "set_current_cluster",
            description: "Set the cluster used when a cluster_id is not given.",
            field: SessionField::CurrentClusterId,
            param: ParamSpec::string("cluster_id", "Cluster ID.").required(),
        }),
        Arc::new(SetSessionField {
            name: "set_current_job",
            description: "Set the job used when a job_id is not given.",
            field: SessionField::CurrentJobId,
            param: ParamSpec::integer("job_id", "Job ID.").required(),
        }),
        Arc::new(SetSessionField {
            name: "set_current_warehouse",
            description: "Set the SQL warehouse used when a warehouse_id is not given.",
            field: SessionField::CurrentWarehouseId,
            param: ParamSpec::string("warehouse_id", "SQL warehouse ID.").required(),
        }),
        Arc::new(ClearSessionContext),
    ]
}
