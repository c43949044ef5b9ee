//! SQL warehouse and statement actions.

use lakeclaw_core::action::{Action, ParamSpec};
use lakeclaw_core::resolve::ResolvedCall;
use lakeclaw_core::session::SessionField;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::client::WorkspaceApi;
use crate::rest::{RestAction, acknowledge, summarize_list};

fn warehouse_id() -> ParamSpec {
    ParamSpec::string(
        "warehouse_id",
        "SQL warehouse ID. Defaults to the session's current warehouse.",
    )
    .required()
    .bind(SessionField::CurrentWarehouseId)
}

pub fn actions(api: &Arc<dyn WorkspaceApi>) -> Vec<Arc<dyn Action>> {
    vec![
        RestAction::get(api, "list_warehouses", "/api/2.0/sql/warehouses")
            .describe("List SQL warehouses with their state and size.")
            .shape(|_, resp| {
                summarize_list(
                    &resp,
                    "warehouses",
                    &["id", "name", "state", "cluster_size", "warehouse_type", "auto_stop_mins"],
                )
            })
            .into_action(),
        RestAction::post(api, "start_warehouse", "/api/2.0/sql/warehouses/{warehouse_id}/start")
            .describe("Start a stopped SQL warehouse.")
            .path_param(warehouse_id())
            .shape(|call, resp| acknowledge(call, resp, "starting"))
            .into_action(),
        RestAction::post(api, "stop_warehouse", "/api/2.0/sql/warehouses/{warehouse_id}/stop")
            .describe("Stop a running SQL warehouse.")
            .path_param(warehouse_id())
            .shape(|call, resp| acknowledge(call, resp, "stopping"))
            .into_action(),
        RestAction::post(api, "execute_query", "/api/2.0/sql/statements")
            .describe(
                "Execute a SQL statement on a warehouse. Waits up to wait_timeout for the \
                 result; a still-running statement can be polled with get_query_results.",
            )
            .body_as(ParamSpec::string("query", "The SQL statement to run.").required(), "statement")
            .body(warehouse_id())
            .body(
                ParamSpec::string("wait_timeout", "How long to wait for the result, 0s or 5s to 50s.")
                    .default_value("30s"),
            )
            .body(ParamSpec::string("catalog", "Default catalog for unqualified names."))
            .body(ParamSpec::string("schema", "Default schema for unqualified names."))
            .shape(summarize_statement)
            .into_action(),
        RestAction::get(api, "get_query_results", "/api/2.0/sql/statements/{statement_id}")
            .describe("Get the status and result rows of a statement started by execute_query.")
            .path_param(ParamSpec::string("statement_id", "Statement ID from execute_query.").required())
            .shape(summarize_statement)
            .into_action(),
    ]
}

/// Flatten a statement response to status, columns and rows.
fn summarize_statement(_: &ResolvedCall, resp: Value) -> Value {
    let columns: Vec<Value> = resp
        .pointer("/manifest/schema/columns")
        .and_then(Value::as_array)
        .map(|cols| cols.iter().filter_map(|c| c.get("name").cloned()).collect())
        .unwrap_or_default();
    let rows = resp
        .pointer("/result/data_array")
        .cloned()
        .unwrap_or_else(|| json!([]));
    let row_count = rows.as_array().map(Vec::len).unwrap_or(0);

    let mut out = json!({
        "statement_id": resp.get("statement_id"),
        "state": resp.pointer("/status/state"),
        "columns": columns,
        "rows": rows,
        "row_count": row_count,
    });
    if let Some(error) = resp.pointer("/status/error/message") {
        out["error"] = error.clone();
    }
    if resp.pointer("/manifest/truncated").and_then(Value::as_bool) == Some(true) {
        out["truncated"] = Value::Bool(true);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWorkspaceApi;
    use crate::test_support::{run, session_with};
    use lakeclaw_core::error::ErrorKind;

    #[tokio::test]
    async fn execute_query_uses_current_warehouse() {
        let mock = Arc::new(MockWorkspaceApi::new());
        mock.respond(
            "/api/2.0/sql/statements",
            json!({
                "statement_id": "st-1",
                "status": {"state": "SUCCEEDED"},
                "manifest": {"schema": {"columns": [{"name": "n"}]}},
                "result": {"data_array": [["1"]]}
            }),
        );
        let out = run(
            mock.clone(),
            "execute_query",
            json!({"query": "SELECT 1 AS n"}),
            Some(session_with(SessionField::CurrentWarehouseId, "wh-7")),
        )
        .await
        .unwrap();

        assert_eq!(out["state"], "SUCCEEDED");
        assert_eq!(out["columns"], json!(["n"]));
        assert_eq!(out["row_count"], 1);
        assert_eq!(
            mock.calls()[0].body,
            Some(json!({"statement": "SELECT 1 AS n", "warehouse_id": "wh-7", "wait_timeout": "30s"}))
        );
    }

    #[tokio::test]
    async fn no_warehouse_anywhere_is_validation() {
        let mock = Arc::new(MockWorkspaceApi::new());
        let err = run(mock.clone(), "execute_query", json!({"query": "SELECT 1"}), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.param.as_deref(), Some("warehouse_id"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn start_warehouse_fills_path() {
        let mock = Arc::new(MockWorkspaceApi::new());
        let out = run(mock.clone(), "start_warehouse", json!({"warehouse_id": "wh-1"}), None)
            .await
            .unwrap();
        assert_eq!(out["status"], "starting");
        assert_eq!(mock.calls()[0].path, "/api/2.0/sql/warehouses/wh-1/start");
    }

    #[test]
    fn failed_statement_surfaces_error() {
        let call = ResolvedCall {
            action: "get_query_results".into(),
            arguments: json!({}),
            provenance: Default::default(),
        };
        let out = summarize_statement(
            &call,
            json!({"statement_id": "st-2", "status": {"state": "FAILED", "error": {"message": "Table not found"}}}),
        );
        assert_eq!(out["error"], "Table not found");
        assert_eq!(out["row_count"], 0);
    }
}
