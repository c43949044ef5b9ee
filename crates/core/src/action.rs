//! Action trait: the abstraction over remote workspace operations.
//!
//! An action is one named operation with a typed parameter schema, a
//! side-effect class and a handler. Actions are registered once in the
//! [`ActionRegistry`]; the registry checks their schemas at registration
//! time so a malformed declaration never reaches a caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ActionError, RegistryError};
use crate::resolve::ResolvedCall;
use crate::session::{SessionField, SessionStore};

/// JSON type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether a JSON value is of this type. Integers are also numbers.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// Declaration of one action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: ParamType,

    pub description: String,

    #[serde(default)]
    pub required: bool,

    /// Schema default, used when neither the caller nor the session supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Allowed values (string parameters only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,

    /// The session field that supplies this parameter when it is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_field: Option<SessionField>,

    /// Relative paths are joined onto the session's workspace path.
    #[serde(default)]
    pub workspace_relative: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
            description: description.into(),
            required: false,
            default: None,
            allowed: Vec::new(),
            session_field: None,
            workspace_relative: false,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean, description)
    }

    pub fn object(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Object, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn bind(mut self, field: SessionField) -> Self {
        self.session_field = Some(field);
        self
    }

    pub fn workspace_relative(mut self) -> Self {
        self.workspace_relative = true;
        self
    }
}

/// What an action does to the world, used for retry decisions and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SideEffect {
    /// Reads remote state only.
    ReadOnly,
    /// Changes remote state.
    Mutating,
    /// Deletes or terminates remote resources.
    Destructive,
    /// Touches only local session state.
    Session,
}

impl SideEffect {
    /// Whether re-issuing the call after an ambiguous failure is harmless.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::ReadOnly | Self::Session)
    }
}

impl std::fmt::Display for SideEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "read-only",
            Self::Mutating => "mutating",
            Self::Destructive => "destructive",
            Self::Session => "session",
        })
    }
}

/// Everything a caller needs to know about an action, without the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub side_effect: SideEffect,
}

impl ActionDescriptor {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Per-invocation context handed to a handler.
#[derive(Clone)]
pub struct ActionContext {
    /// The caller's session identifier.
    pub session_id: String,

    /// The session store, for actions that read or change session state.
    pub sessions: Arc<dyn SessionStore>,
}

impl ActionContext {
    pub fn new(session_id: impl Into<String>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            session_id: session_id.into(),
            sessions,
        }
    }
}

/// The core Action trait.
///
/// Each remote operation (list clusters, run a job, execute a statement) and
/// each session-context operation implements this trait.
#[async_trait]
pub trait Action: Send + Sync {
    /// The unique name of this action (e.g., "start_cluster").
    fn name(&self) -> &str;

    /// A short description of what this action does (sent to the engine).
    fn description(&self) -> &str;

    /// The declared parameters.
    fn params(&self) -> Vec<ParamSpec>;

    /// The side-effect class.
    fn side_effect(&self) -> SideEffect;

    /// Run the action with fully resolved arguments.
    async fn execute(&self, ctx: &ActionContext, call: &ResolvedCall) -> Result<Value, ActionError>;

    fn descriptor(&self) -> ActionDescriptor {
        ActionDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            params: self.params(),
            side_effect: self.side_effect(),
        }
    }
}

struct Registered {
    descriptor: ActionDescriptor,
    handler: Arc<dyn Action>,
}

/// The catalog of available actions, ordered by name.
pub struct ActionRegistry {
    actions: BTreeMap<String, Registered>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    /// Register an action after checking its declaration.
    pub fn register(&mut self, action: Arc<dyn Action>) -> Result<(), RegistryError> {
        let descriptor = action.descriptor();
        if self.actions.contains_key(&descriptor.name) {
            warn!(action = %descriptor.name, "Action registered twice");
            return Err(RegistryError::DuplicateAction(descriptor.name));
        }
        if let Err(e) = validate_descriptor(&descriptor) {
            warn!(action = %descriptor.name, error = %e, "Action declaration rejected");
            return Err(e);
        }
        debug!(
            action = %descriptor.name,
            side_effect = %descriptor.side_effect,
            params = descriptor.params.len(),
            "Action registered"
        );
        self.actions.insert(
            descriptor.name.clone(),
            Registered {
                descriptor,
                handler: action,
            },
        );
        Ok(())
    }

    /// Register several actions, stopping at the first invalid one.
    pub fn register_all(
        &mut self,
        actions: impl IntoIterator<Item = Arc<dyn Action>>,
    ) -> Result<(), RegistryError> {
        for action in actions {
            self.register(action)?;
        }
        Ok(())
    }

    /// All descriptors, ordered by action name.
    pub fn list(&self) -> Vec<&ActionDescriptor> {
        self.actions.values().map(|r| &r.descriptor).collect()
    }

    /// Look up an action's handler and descriptor by name.
    pub fn lookup(&self, name: &str) -> Option<(&ActionDescriptor, Arc<dyn Action>)> {
        self.actions
            .get(name)
            .map(|r| (&r.descriptor, r.handler.clone()))
    }

    pub fn descriptor(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.get(name).map(|r| &r.descriptor)
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_descriptor(descriptor: &ActionDescriptor) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for param in &descriptor.params {
        let invalid = |reason: &str| RegistryError::InvalidParam {
            action: descriptor.name.clone(),
            param: param.name.clone(),
            reason: reason.to_string(),
        };

        if !seen.insert(param.name.as_str()) {
            return Err(RegistryError::DuplicateParam {
                action: descriptor.name.clone(),
                param: param.name.clone(),
            });
        }
        if !param.allowed.is_empty() && param.ty != ParamType::String {
            return Err(invalid("declares allowed values on a non-string type"));
        }
        if param.workspace_relative && param.ty != ParamType::String {
            return Err(invalid("is workspace-relative but not a string"));
        }
        if param.session_field.is_some()
            && !matches!(param.ty, ParamType::String | ParamType::Integer)
        {
            return Err(invalid("binds a session field but is neither string nor integer"));
        }
        if let Some(default) = &param.default {
            if param.required {
                return Err(invalid("is required but also declares a default"));
            }
            if !param.ty.accepts(default) {
                return Err(invalid(&format!(
                    "has a default that is not of type {}",
                    param.ty.as_str()
                )));
            }
            if let Some(s) = default.as_str() {
                if !param.allowed.is_empty() && !param.allowed.iter().any(|a| a == s) {
                    return Err(invalid("has a default outside its allowed values"));
                }
            }
        }
    }
    Ok(())
}
