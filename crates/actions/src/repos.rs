//! Git folder (repo) actions.

use lakeclaw_core::action::{Action, ParamSpec};
use std::sync::Arc;

use crate::client::WorkspaceApi;
use crate::rest::{RestAction, summarize_list};

pub fn actions(api: &Arc<dyn WorkspaceApi>) -> Vec<Arc<dyn Action>> {
    vec![
        RestAction::get(api, "list_repos", "/api/2.0/repos")
            .describe("List Git folders linked into the workspace.")
            .query(ParamSpec::string("path_prefix", "Only repos whose workspace path starts with this."))
            .query(ParamSpec::string("next_page_token", "Token from a previous page."))
            .shape(|_, resp| summarize_list(&resp, "repos", &["id", "path", "url", "provider", "branch", "head_commit_id"]))
            .into_action(),
    ]
}
