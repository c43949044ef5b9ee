//! Tool-schema bridge: action descriptors → engine tool declarations.
//!
//! Pure and deterministic. The output follows registry order, so the same
//! registry always yields the same declaration list.

use lakeclaw_core::action::{ActionDescriptor, ActionRegistry, ParamSpec};
use lakeclaw_core::provider::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::str::FromStr;
use tracing::{debug, warn};

/// An action left out of the catalog, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedAction {
    pub name: String,
    pub reason: String,
}

/// Tool declarations built from a registry.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
    excluded: Vec<ExcludedAction>,
}

impl ToolCatalog {
    /// Translate every registered action. Unrepresentable ones are logged
    /// once here and skipped.
    pub fn build(registry: &ActionRegistry) -> Self {
        let mut catalog = Self::default();
        for descriptor in registry.list() {
            match declaration(descriptor) {
                Ok(def) => catalog.definitions.push(def),
                Err(reason) => {
                    warn!(action = %descriptor.name, %reason, "Excluding action from tool catalog");
                    catalog.excluded.push(ExcludedAction {
                        name: descriptor.name.clone(),
                        reason,
                    });
                }
            }
        }
        debug!(
            tools = catalog.definitions.len(),
            excluded = catalog.excluded.len(),
            "Tool catalog built"
        );
        catalog
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn excluded(&self) -> &[ExcludedAction] {
        &self.excluded
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Whether the engine was offered a tool by this name.
    pub fn declares(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.name == name)
    }

    pub fn render(&self, format: ToolFormat) -> Vec<Value> {
        self.definitions.iter().map(|d| format.render(d)).collect()
    }
}

/// Build one declaration, or say why the action cannot be declared.
pub fn declaration(descriptor: &ActionDescriptor) -> Result<ToolDefinition, String> {
    if !is_valid_name(&descriptor.name) {
        return Err(format!(
            "name '{}' must match ^[a-zA-Z0-9_-]{{1,64}}$",
            descriptor.name
        ));
    }
    if descriptor.description.trim().is_empty() {
        return Err("description is empty".into());
    }

    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &descriptor.params {
        if !is_valid_name(&param.name) {
            return Err(format!("parameter name '{}' is not representable", param.name));
        }
        properties.insert(param.name.clone(), property(param));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    Ok(ToolDefinition {
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    })
}

fn property(param: &ParamSpec) -> Value {
    let mut prop = Map::new();
    prop.insert("type".into(), Value::String(param.ty.as_str().into()));
    prop.insert("description".into(), Value::String(param.description.clone()));
    if !param.allowed.is_empty() {
        prop.insert("enum".into(), json!(param.allowed));
    }
    if let Some(default) = &param.default {
        prop.insert("default".into(), default.clone());
    }
    Value::Object(prop)
}

fn is_valid_name(name: &str) -> bool {
    (1..=64).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Wire shape of a tool declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolFormat {
    /// `{"type": "function", "function": {...}}`
    #[default]
    OpenAi,
    /// `{"name", "description", "input_schema"}`
    Anthropic,
}

impl ToolFormat {
    pub fn render(&self, def: &ToolDefinition) -> Value {
        match self {
            Self::OpenAi => json!({
                "type": "function",
                "function": {
                    "name": def.name,
                    "description": def.description,
                    "parameters": def.parameters,
                }
            }),
            Self::Anthropic => json!({
                "name": def.name,
                "description": def.description,
                "input_schema": def.parameters,
            }),
        }
    }
}

impl FromStr for ToolFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!("unknown tool format '{other}' (expected openai or anthropic)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lakeclaw_actions::MockWorkspaceApi;
    use lakeclaw_core::action::{Action, ActionContext, SideEffect};
    use lakeclaw_core::error::ActionError;
    use lakeclaw_core::resolve::ResolvedCall;
    use std::sync::Arc;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Action for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            self.1
        }
        fn params(&self) -> Vec<ParamSpec> {
            vec![]
        }
        fn side_effect(&self) -> SideEffect {
            SideEffect::ReadOnly
        }
        async fn execute(&self, _: &ActionContext, _: &ResolvedCall) -> Result<Value, ActionError> {
            Ok(Value::Null)
        }
    }

    fn builtin_catalog() -> ToolCatalog {
        let registry = lakeclaw_actions::default_registry(Arc::new(MockWorkspaceApi::new())).unwrap();
        ToolCatalog::build(&registry)
    }

    #[test]
    fn every_builtin_action_is_representable() {
        let catalog = builtin_catalog();
        assert!(catalog.excluded().is_empty());
        assert_eq!(catalog.len(), 36);
    }

    #[test]
    fn build_is_deterministic() {
        assert_eq!(builtin_catalog().definitions(), builtin_catalog().definitions());
    }

    #[test]
    fn schema_carries_required_enum_and_default() {
        let catalog = builtin_catalog();
        let export = catalog
            .definitions()
            .iter()
            .find(|d| d.name == "export_file")
            .unwrap();
        assert_eq!(export.parameters["type"], "object");
        assert_eq!(export.parameters["required"], json!(["path"]));
        let format = &export.parameters["properties"]["format"];
        assert_eq!(format["type"], "string");
        assert_eq!(format["default"], "SOURCE");
        assert_eq!(format["enum"], json!(["SOURCE", "HTML", "JUPYTER", "DBC"]));
    }

    #[test]
    fn bad_actions_excluded_not_fatal() {
        let mut registry = ActionRegistry::new();
        registry
            .register_all([
                Arc::new(Named("list things", "Has a space")) as Arc<dyn Action>,
                Arc::new(Named("quiet", "  ")),
                Arc::new(Named("ok_action", "Fine")),
            ])
            .unwrap();
        let catalog = ToolCatalog::build(&registry);

        let names: Vec<_> = catalog.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["ok_action"]);
        let excluded: Vec<_> = catalog.excluded().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(excluded, ["list things", "quiet"]);
    }

    #[test]
    fn name_length_limit() {
        assert!(is_valid_name(&"a".repeat(64)));
        assert!(!is_valid_name(&"a".repeat(65)));
        assert!(!is_valid_name(""));
        assert!(is_valid_name("get-run_2"));
    }

    #[test]
    fn render_formats() {
        let def = ToolDefinition {
            name: "list_jobs".into(),
            description: "List jobs".into(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        };
        let openai = ToolFormat::OpenAi.render(&def);
        assert_eq!(openai["type"], "function");
        assert_eq!(openai["function"]["name"], "list_jobs");

        let anthropic = ToolFormat::Anthropic.render(&def);
        assert_eq!(anthropic["input_schema"]["type"], "object");
        assert!(anthropic.get("parameters").is_none());
    }

    #[test]
    fn format_parses() {
        assert_eq!("OpenAI".parse::<ToolFormat>().unwrap(), ToolFormat::OpenAi);
        assert_eq!("anthropic".parse::<ToolFormat>().unwrap(), ToolFormat::Anthropic);
        assert!("gemini".parse::<ToolFormat>().is_err());
    }
}
