//! Data-driven workspace actions.
//!
//! Most workspace actions are one REST call: pick the verb, fill a path
//! template, spread the resolved arguments over query string or body, and
//! optionally reshape the response. `RestAction` captures that as data so
//! each action module is a list of declarations.

use async_trait::async_trait;
use lakeclaw_core::action::{Action, ActionContext, ParamSpec, SideEffect};
use lakeclaw_core::error::ActionError;
use lakeclaw_core::resolve::ResolvedCall;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::client::WorkspaceApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Where a resolved argument goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Substituted into `{name}` in the path template
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone)]
pub struct RestParam {
    pub spec: ParamSpec,
    pub placement: Placement,
    /// Field name on the wire when it differs from the parameter name
    pub wire_name: Option<&'static str>,
}

impl RestParam {
    fn wire(&self) -> &str {
        self.wire_name.unwrap_or(&self.spec.name)
    }
}

/// Post-processing of a successful response.
pub type Shaper = fn(&ResolvedCall, Value) -> Value;

/// Turns the flat body (body parameters keyed by wire name) into the
/// request body, for endpoints that want nesting or encoding.
pub type BodyBuilder = fn(&ResolvedCall, Map<String, Value>) -> Value;

pub struct RestAction {
    name: &'static str,
    description: &'static str,
    method: Method,
    path: &'static str,
    params: Vec<RestParam>,
    side_effect: SideEffect,
    shape: Option<Shaper>,
    build_body: Option<BodyBuilder>,
    api: Arc<dyn WorkspaceApi>,
}

impl RestAction {
    pub fn get(api: &Arc<dyn WorkspaceApi>, name: &'static str, path: &'static str) -> Self {
        Self::new(api, Method::Get, name, path, SideEffect::ReadOnly)
    }

    /// POSTs default to `Mutating`; override with [`side_effect`](Self::side_effect).
    pub fn post(api: &Arc<dyn WorkspaceApi>, name: &'static str, path: &'static str) -> Self {
        Self::new(api, Method::Post, name, path, SideEffect::Mutating)
    }

    fn new(
        api: &Arc<dyn WorkspaceApi>,
        method: Method,
        name: &'static str,
        path: &'static str,
        side_effect: SideEffect,
    ) -> Self {
        Self {
            name,
            description: "",
            method,
            path,
            params: Vec::new(),
            side_effect,
            shape: None,
            build_body: None,
            api: api.clone(),
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn side_effect(mut self, side_effect: SideEffect) -> Self {
        self.side_effect = side_effect;
        self
    }

    pub fn path_param(self, spec: ParamSpec) -> Self {
        self.param(spec, Placement::Path, None)
    }

    pub fn query(self, spec: ParamSpec) -> Self {
        self.param(spec, Placement::Query, None)
    }

    pub fn body(self, spec: ParamSpec) -> Self {
        self.param(spec, Placement::Body, None)
    }

    /// A body field whose wire name differs from the parameter name.
    pub fn body_as(self, spec: ParamSpec, wire_name: &'static str) -> Self {
        self.param(spec, Placement::Body, Some(wire_name))
    }

    fn param(mut self, spec: ParamSpec, placement: Placement, wire_name: Option<&'static str>) -> Self {
        self.params.push(RestParam {
            spec,
            placement,
            wire_name,
        });
        self
    }

    pub fn shape(mut self, shaper: Shaper) -> Self {
        self.shape = Some(shaper);
        self
    }

    pub fn build_body(mut self, builder: BodyBuilder) -> Self {
        self.build_body = Some(builder);
        self
    }

    pub fn into_action(self) -> Arc<dyn Action> {
        Arc::new(self)
    }

    /// Fill the path template from resolved arguments.
    fn render_path(&self, call: &ResolvedCall) -> Result<String, ActionError> {
        let mut path = self.path.to_string();
        for p in self.params.iter().filter(|p| p.placement == Placement::Path) {
            let value = call
                .get(&p.spec.name)
                .map(scalar_to_string)
                .ok_or_else(|| ActionError::missing_param(&p.spec.name))?;
            if !is_path_segment(&value) {
                return Err(ActionError::invalid_param(
                    &p.spec.name,
                    format!("'{value}' is not a valid identifier"),
                ));
            }
            path = path.replace(&format!("{{{}}}", p.spec.name), &value);
        }
        Ok(path)
    }

    fn query_pairs(&self, call: &ResolvedCall) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter(|p| p.placement == Placement::Query)
            .filter_map(|p| {
                call.get(&p.spec.name)
                    .map(|v| (p.wire().to_string(), scalar_to_string(v)))
            })
            .collect()
    }

    fn body_object(&self, call: &ResolvedCall) -> Value {
        let mut body = Map::new();
        for p in self.params.iter().filter(|p| p.placement == Placement::Body) {
            if let Some(v) = call.get(&p.spec.name) {
                body.insert(p.wire().to_string(), v.clone());
            }
        }
        match self.build_body {
            Some(builder) => builder(call, body),
            None => Value::Object(body),
        }
    }
}

/// One URL path segment: ASCII alphanumerics, `_`, `-` and `.`, but not a
/// dot-only segment. Three-part table names (`main.sales.orders`) pass.
fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && !value.chars().all(|c| c == '.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[async_trait]
impl Action for RestAction {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn params(&self) -> Vec<ParamSpec> {
        self.params.iter().map(|p| p.spec.clone()).collect()
    }

    fn side_effect(&self) -> SideEffect {
        self.side_effect
    }

    async fn execute(&self, _ctx: &ActionContext, call: &ResolvedCall) -> Result<Value, ActionError> {
        let path = self.render_path(call)?;
        let response = match self.method {
            Method::Get => self.api.get(&path, &self.query_pairs(call)).await?,
            Method::Post => self.api.post(&path, self.body_object(call)).await?,
        };
        Ok(match self.shape {
            Some(shaper) => shaper(call, response),
            None => response,
        })
    }
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shaper for list endpoints: `{"<key>": [...]}` becomes
/// `{"<key>": [...], "count": n}` with each item cut down to `fields`.
pub fn summarize_list(response: &Value, key: &str, fields: &[&str]) -> Value {
    let items: Vec<Value> = response
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|item| {
                    let mut out = Map::new();
                    for field in fields {
                        if let Some(v) = item.get(*field) {
                            out.insert((*field).to_string(), v.clone());
                        }
                    }
                    Value::Object(out)
                })
                .collect()
        })
        .unwrap_or_default();
    let count = items.len();
    let mut out = Map::new();
    out.insert(key.to_string(), Value::Array(items));
    out.insert("count".into(), count.into());
    if let Some(token) = response.get("next_page_token") {
        out.insert("next_page_token".into(), token.clone());
    }
    Value::Object(out)
}

/// Shaper for fire-and-forget mutations whose response is `{}`: echo the
/// identifying arguments with a status.
pub fn acknowledge(call: &ResolvedCall, response: Value, status: &str) -> Value {
    let mut out = match call.arguments.clone() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    out.insert("status".into(), Value::String(status.to_string()));
    if let Value::Object(extra) = response {
        for (k, v) in extra {
            out.entry(k).or_insert(v);
        }
    }
    Value::Object(out)
}
