//! Secret scope browsing. Secret values are never read.

use lakeclaw_core::action::{Action, ParamSpec};
use lakeclaw_core::resolve::ResolvedCall;
use serde_json::Value;
use std::sync::Arc;

use crate::client::WorkspaceApi;
use crate::rest::{RestAction, summarize_list};

pub fn actions(api: &Arc<dyn WorkspaceApi>) -> Vec<Arc<dyn Action>> {
    vec![
        RestAction::get(api, "list_secret_scopes", "/api/2.0/secrets/scopes/list")
            .describe("List secret scopes in the workspace.")
            .shape(|_, resp| summarize_list(&resp, "scopes", &["name", "backend_type"]))
            .into_action(),
        RestAction::get(api, "list_secrets", "/api/2.0/secrets/list")
            .describe("List the secret keys in a scope. Values are never returned.")
            .query(ParamSpec::string("scope", "Secret scope name.").required())
            .shape(secret_keys)
            .into_action(),
    ]
}

fn secret_keys(call: &ResolvedCall, resp: Value) -> Value {
    let mut out = summarize_list(&resp, "secrets", &["key", "last_updated_timestamp"]);
    out["scope"] = call.get("scope").cloned().unwrap_or(Value::Null);
    out
}
