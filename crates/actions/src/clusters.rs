//! Cluster actions.

use lakeclaw_core::action::{Action, ParamSpec, SideEffect};
use lakeclaw_core::resolve::ResolvedCall;
use lakeclaw_core::session::SessionField;
use serde_json::Value;
use std::sync::Arc;

use crate::client::WorkspaceApi;
use crate::rest::{RestAction, acknowledge, summarize_list};

const SUMMARY_FIELDS: &[&str] = &[
    "cluster_id",
    "cluster_name",
    "state",
    "spark_version",
    "node_type_id",
    "num_workers",
    "creator_user_name",
];

fn cluster_id() -> ParamSpec {
    ParamSpec::string(
        "cluster_id",
        "Cluster ID. Defaults to the session's current cluster.",
    )
    .required()
    .bind(SessionField::CurrentClusterId)
}

pub fn actions(api: &Arc<dyn WorkspaceApi>) -> Vec<Arc<dyn Action>> {
    vec![
        RestAction::get(api, "list_clusters", "/api/2.0/clusters/list")
            .describe("List all clusters in the workspace with their state and size.")
            .shape(|_, resp| summarize_list(&resp, "clusters", SUMMARY_FIELDS))
            .into_action(),
        RestAction::get(api, "get_cluster", "/api/2.0/clusters/get")
            .describe("Get detailed information about one cluster.")
            .query(cluster_id())
            .into_action(),
        RestAction::post(api, "start_cluster", "/api/2.0/clusters/start")
            .describe("Start a terminated cluster.")
            .body(cluster_id())
            .shape(starting)
            .into_action(),
        RestAction::post(api, "stop_cluster", "/api/2.0/clusters/delete")
            .describe("Terminate a running cluster. Its configuration is kept and it can be started again.")
            .body(cluster_id())
            .shape(terminating)
            .into_action(),
        RestAction::post(api, "delete_cluster", "/api/2.0/clusters/permanent-delete")
            .describe("Permanently delete a cluster and its configuration. This cannot be undone.")
            .body(cluster_id())
            .side_effect(SideEffect::Destructive)
            .shape(|call, resp| acknowledge(call, resp, "deleted"))
            .into_action(),
    ]
}

fn starting(call: &ResolvedCall, resp: Value) -> Value {
    acknowledge(call, resp, "starting")
}

fn terminating(call: &ResolvedCall, resp: Value) -> Value {
    acknowledge(call, resp, "terminating")
}
