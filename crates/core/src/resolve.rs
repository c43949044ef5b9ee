//! Context resolution: merging explicit arguments with session defaults.
//!
//! For every declared parameter the value comes from, in order:
//! 1. the caller's explicit argument,
//! 2. the session field the parameter is bound to,
//! 3. the schema default.
//!
//! A required parameter found in none of them is a validation failure naming
//! that parameter; it is never dispatched as null.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::action::{ActionDescriptor, ParamSpec, ParamType};
use crate::error::ActionError;
use crate::session::SessionRecord;

/// Where a resolved argument came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Explicit,
    Session,
    SchemaDefault,
}

/// The outcome of resolving one action invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCall {
    pub action: String,

    /// Final arguments. Optional parameters with no value are absent.
    pub arguments: Value,

    /// Source of each present argument.
    pub provenance: BTreeMap<String, Provenance>,
}

impl ResolvedCall {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// A string argument the handler cannot do without.
    pub fn require_str(&self, name: &str) -> Result<&str, ActionError> {
        self.str(name).ok_or_else(|| ActionError::missing_param(name))
    }

    pub fn provenance(&self, name: &str) -> Option<Provenance> {
        self.provenance.get(name).copied()
    }
}

/// Stateless resolver; see the module docs for the precedence rules.
pub struct ContextResolver;

impl ContextResolver {
    pub fn resolve(
        descriptor: &ActionDescriptor,
        explicit: &Map<String, Value>,
        session: &SessionRecord,
    ) -> Result<ResolvedCall, ActionError> {
        if let Some(unknown) = explicit.keys().find(|k| descriptor.param(k).is_none()) {
            return Err(ActionError::invalid_param(
                unknown.as_str(),
                format!(
                    "unknown parameter '{unknown}' for action '{}'",
                    descriptor.name
                ),
            ));
        }

        let mut arguments = Map::new();
        let mut provenance = BTreeMap::new();

        for param in &descriptor.params {
            let supplied = explicit.get(&param.name).filter(|v| !v.is_null());
            let stored = param.session_field.and_then(|f| session.field(f));

            let (value, source) = if let Some(value) = supplied {
                (check_explicit(param, value)?, Provenance::Explicit)
            } else if let Some(stored) = stored {
                (from_session(param, stored)?, Provenance::Session)
            } else if let Some(default) = &param.default {
                (default.clone(), Provenance::SchemaDefault)
            } else if param.required {
                return Err(ActionError::missing_param(&param.name));
            } else {
                continue;
            };

            let value = if param.workspace_relative && source != Provenance::Session {
                join_workspace_path(value, session.workspace_path.as_deref())
            } else {
                value
            };

            arguments.insert(param.name.clone(), value);
            provenance.insert(param.name.clone(), source);
        }

        Ok(ResolvedCall {
            action: descriptor.name.clone(),
            arguments: Value::Object(arguments),
            provenance,
        })
    }
}

/// Type-check an explicit argument, applying the two coercions engines need:
/// numeric strings for integers, and numbers for strings.
fn check_explicit(param: &ParamSpec, value: &Value) -> Result<Value, ActionError> {
    let coerced = match (param.ty, value) {
        (ParamType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| type_mismatch(param, value))?,
        (ParamType::String, Value::Number(n)) => Value::String(n.to_string()),
        _ if param.ty.accepts(value) => value.clone(),
        _ => return Err(type_mismatch(param, value)),
    };

    if let Some(s) = coerced.as_str() {
        if !param.allowed.is_empty() && !param.allowed.iter().any(|a| a == s) {
            return Err(ActionError::invalid_param(
                &param.name,
                format!(
                    "parameter '{}' must be one of [{}], got '{s}'",
                    param.name,
                    param.allowed.join(", ")
                ),
            ));
        }
    }
    Ok(coerced)
}

fn from_session(param: &ParamSpec, stored: &str) -> Result<Value, ActionError> {
    match param.ty {
        ParamType::Integer => stored.trim().parse::<i64>().map(Value::from).map_err(|_| {
            ActionError::invalid_param(
                &param.name,
                format!(
                    "session value '{stored}' for parameter '{}' is not an integer",
                    param.name
                ),
            )
        }),
        _ => Ok(Value::String(stored.to_string())),
    }
}

fn type_mismatch(param: &ParamSpec, value: &Value) -> ActionError {
    ActionError::invalid_param(
        &param.name,
        format!(
            "parameter '{}' must be of type {}, got {value}",
            param.name,
            param.ty.as_str()
        ),
    )
}

fn join_workspace_path(value: Value, base: Option<&str>) -> Value {
    match (value, base) {
        (Value::String(path), Some(base)) if !path.starts_with('/') => {
            let base = base.trim_end_matches('/');
            if path.is_empty() {
                Value::String(base.to_string())
            } else {
                Value::String(format!("{base}/{path}"))
            }
        }
        (value, _) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SideEffect;
    use crate::error::ErrorKind;
    use crate::session::SessionField;
    use serde_json::json;

    fn start_cluster() -> ActionDescriptor {
        ActionDescriptor {
            name: "start_cluster".into(),
            description: "Start a cluster".into(),
            params: vec![
                ParamSpec::string("cluster_id", "Cluster to start")
                    .required()
                    .bind(SessionField::CurrentClusterId),
            ],
            side_effect: SideEffect::Mutating,
        }
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn session_with_cluster(id: &str) -> SessionRecord {
        let mut rec = SessionRecord::new("S1");
        rec.set_field(SessionField::CurrentClusterId, id);
        rec
    }

    #[test]
    fn session_default_substituted() {
        let call = ContextResolver::resolve(
            &start_cluster(),
            &Map::new(),
            &session_with_cluster("c-42"),
        )
        .unwrap();
        assert_eq!(call.str("cluster_id"), Some("c-42"));
        assert_eq!(call.provenance("cluster_id"), Some(Provenance::Session));
    }

    #[test]
    fn explicit_overrides_session() {
        let session = session_with_cluster("c-42");
        let call = ContextResolver::resolve(
            &start_cluster(),
            &args(json!({"cluster_id": "c-99"})),
            &session,
        )
        .unwrap();
        assert_eq!(call.str("cluster_id"), Some("c-99"));
        assert_eq!(call.provenance("cluster_id"), Some(Provenance::Explicit));
        assert_eq!(session.current_cluster_id.as_deref(), Some("c-42"));
    }

    #[test]
    fn missing_required_names_param() {
        let err = ContextResolver::resolve(&start_cluster(), &Map::new(), &SessionRecord::new("S2"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.param.as_deref(), Some("cluster_id"));
    }

    #[test]
    fn precedence_explicit_session_default() {
        let descriptor = ActionDescriptor {
            name: "list_workspace".into(),
            description: "List".into(),
            params: vec![
                ParamSpec::string("path", "Path")
                    .bind(SessionField::WorkspacePath)
                    .default_value("/Workspace"),
            ],
            side_effect: SideEffect::ReadOnly,
        };

        let empty = SessionRecord::new("s");
        let call = ContextResolver::resolve(&descriptor, &Map::new(), &empty).unwrap();
        assert_eq!(call.str("path"), Some("/Workspace"));
        assert_eq!(call.provenance("path"), Some(Provenance::SchemaDefault));

        let mut with_path = SessionRecord::new("s");
        with_path.set_field(SessionField::WorkspacePath, "/Users/me");
        let call = ContextResolver::resolve(&descriptor, &Map::new(), &with_path).unwrap();
        assert_eq!(call.str("path"), Some("/Users/me"));

        let call =
            ContextResolver::resolve(&descriptor, &args(json!({"path": "/Shared"})), &with_path)
                .unwrap();
        assert_eq!(call.str("path"), Some("/Shared"));
    }

    #[test]
    fn explicit_null_treated_as_absent() {
        let call = ContextResolver::resolve(
            &start_cluster(),
            &args(json!({"cluster_id": null})),
            &session_with_cluster("c-42"),
        )
        .unwrap();
        assert_eq!(call.str("cluster_id"), Some("c-42"));
    }

    #[test]
    fn optional_without_value_is_absent() {
        let descriptor = ActionDescriptor {
            name: "list_jobs".into(),
            description: "List jobs".into(),
            params: vec![ParamSpec::string("name", "Filter by name")],
            side_effect: SideEffect::ReadOnly,
        };
        let call = ContextResolver::resolve(&descriptor, &Map::new(), &SessionRecord::new("s"))
            .unwrap();
        assert!(call.get("name").is_none());
        assert!(call.provenance.is_empty());
    }

    #[test]
    fn unknown_argument_rejected() {
        let err = ContextResolver::resolve(
            &start_cluster(),
            &args(json!({"cluster": "c-1"})),
            &SessionRecord::new("s"),
        )
        .unwrap_err();
        assert_eq!(err.param.as_deref(), Some("cluster"));
    }

    #[test]
    fn integer_coercions() {
        let descriptor = ActionDescriptor {
            name: "get_job".into(),
            description: "Get a job".into(),
            params: vec![
                ParamSpec::integer("job_id", "Job")
                    .required()
                    .bind(SessionField::CurrentJobId),
            ],
            side_effect: SideEffect::ReadOnly,
        };

        let call = ContextResolver::resolve(
            &descriptor,
            &args(json!({"job_id": "123"})),
            &SessionRecord::new("s"),
        )
        .unwrap();
        assert_eq!(call.i64("job_id"), Some(123));

        let mut session = SessionRecord::new("s");
        session.set_field(SessionField::CurrentJobId, "456");
        let call = ContextResolver::resolve(&descriptor, &Map::new(), &session).unwrap();
        assert_eq!(call.i64("job_id"), Some(456));

        session.set_field(SessionField::CurrentJobId, "not-a-number");
        let err = ContextResolver::resolve(&descriptor, &Map::new(), &session).unwrap_err();
        assert_eq!(err.param.as_deref(), Some("job_id"));

        let err = ContextResolver::resolve(
            &descriptor,
            &args(json!({"job_id": true})),
            &SessionRecord::new("s"),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn allowed_values_enforced() {
        let descriptor = ActionDescriptor {
            name: "export_file".into(),
            description: "Export".into(),
            params: vec![ParamSpec::string("format", "Format").one_of(&["SOURCE", "HTML"])],
            side_effect: SideEffect::ReadOnly,
        };
        let err = ContextResolver::resolve(
            &descriptor,
            &args(json!({"format": "PDF"})),
            &SessionRecord::new("s"),
        )
        .unwrap_err();
        assert!(err.message.contains("SOURCE"));
    }

    #[test]
    fn relative_paths_join_workspace_path() {
        let descriptor = ActionDescriptor {
            name: "mkdirs".into(),
            description: "Create directories".into(),
            params: vec![
                ParamSpec::string("path", "Directory")
                    .required()
                    .workspace_relative(),
            ],
            side_effect: SideEffect::Mutating,
        };
        let mut session = SessionRecord::new("s");
        session.set_field(SessionField::WorkspacePath, "/Users/me/");

        let call =
            ContextResolver::resolve(&descriptor, &args(json!({"path": "etl/daily"})), &session)
                .unwrap();
        assert_eq!(call.str("path"), Some("/Users/me/etl/daily"));

        let call =
            ContextResolver::resolve(&descriptor, &args(json!({"path": "/Shared/x"})), &session)
                .unwrap();
        assert_eq!(call.str("path"), Some("/Shared/x"));

        let call = ContextResolver::resolve(
            &descriptor,
            &args(json!({"path": "etl"})),
            &SessionRecord::new("s"),
        )
        .unwrap();
        assert_eq!(call.str("path"), Some("etl"));
    }
}
