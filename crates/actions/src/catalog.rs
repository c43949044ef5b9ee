//! Unity Catalog browsing actions.

use lakeclaw_core::action::{Action, ParamSpec};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::client::WorkspaceApi;
use crate::rest::{RestAction, summarize_list};

pub fn actions(api: &Arc<dyn WorkspaceApi>) -> Vec<Arc<dyn Action>> {
    vec![
        RestAction::get(api, "list_catalogs", "/api/2.1/unity-catalog/catalogs")
            .describe("List catalogs in the metastore.")
            .shape(|_, resp| summarize_list(&resp, "catalogs", &["name", "comment", "owner", "catalog_type"]))
            .into_action(),
        RestAction::get(api, "list_schemas", "/api/2.1/unity-catalog/schemas")
            .describe("List schemas in a catalog.")
            .query(ParamSpec::string("catalog_name", "Parent catalog.").required())
            .shape(|_, resp| summarize_list(&resp, "schemas", &["name", "full_name", "comment", "owner"]))
            .into_action(),
        RestAction::get(api, "list_tables", "/api/2.1/unity-catalog/tables")
            .describe("List tables in a schema.")
            .query(ParamSpec::string("catalog_name", "Parent catalog.").required())
            .query(ParamSpec::string("schema_name", "Parent schema.").required())
            .query(ParamSpec::integer("max_results", "Maximum number of tables to return.").default_value(100))
            .shape(|_, resp| {
                summarize_list(&resp, "tables", &["name", "full_name", "table_type", "data_source_format"])
            })
            .into_action(),
        RestAction::get(api, "get_table", "/api/2.1/unity-catalog/tables/{full_name}")
            .describe("Get a table's columns and storage details.")
            .path_param(
                ParamSpec::string("full_name", "Three-level table name, catalog.schema.table.").required(),
            )
            .shape(|_, resp| table_summary(resp))
            .into_action(),
        RestAction::get(api, "list_volumes", "/api/2.1/unity-catalog/volumes")
            .describe("List volumes in a schema.")
            .query(ParamSpec::string("catalog_name", "Parent catalog.").required())
            .query(ParamSpec::string("schema_name", "Parent schema.").required())
            .shape(|_, resp| {
                summarize_list(&resp, "volumes", &["name", "full_name", "volume_type", "storage_location"])
            })
            .into_action(),
    ]
}

fn table_summary(resp: Value) -> Value {
    let columns: Vec<Value> = resp
        .get("columns")
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .map(|c| {
                    json!({
                        "name": c.get("name"),
                        "type": c.get("type_text"),
                        "nullable": c.get("nullable"),
                        "comment": c.get("comment"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    json!({
        "full_name": resp.get("full_name"),
        "table_type": resp.get("table_type"),
        "data_source_format": resp.get("data_source_format"),
        "storage_location": resp.get("storage_location"),
        "owner": resp.get("owner"),
        "comment": resp.get("comment"),
        "columns": columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWorkspaceApi;
    use crate::test_support::run;
    use lakeclaw_core::error::ErrorKind;

    #[tokio::test]
    async fn get_table_summarizes_columns() {
        let mock = Arc::new(MockWorkspaceApi::new());
        mock.respond(
            "/api/2.1/unity-catalog/tables/main.sales.orders",
            json!({
                "full_name": "main.sales.orders",
                "table_type": "MANAGED",
                "columns": [{"name": "id", "type_text": "bigint", "nullable": false, "position": 0}]
            }),
        );
        let out = run(mock, "get_table", json!({"full_name": "main.sales.orders"}), None)
            .await
            .unwrap();
        assert_eq!(out["columns"][0], json!({"name": "id", "type": "bigint", "nullable": false, "comment": null}));
    }

    #[tokio::test]
    async fn list_tables_requires_both_parents() {
        let mock = Arc::new(MockWorkspaceApi::new());
        let err = run(mock, "list_tables", json!({"catalog_name": "main"}), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.param.as_deref(), Some("schema_name"));
    }

    #[tokio::test]
    async fn list_volumes_names_both_parents() {
        let mock = Arc::new(MockWorkspaceApi::new());
        mock.respond(
            "/api/2.1/unity-catalog/volumes",
            json!({"volumes": [{"name": "raw", "full_name": "main.sales.raw", "volume_type": "MANAGED", "owner": "ana"}]}),
        );
        let out = run(
            mock.clone(),
            "list_volumes",
            json!({"catalog_name": "main", "schema_name": "sales"}),
            None,
        )
        .await
        .unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["volumes"][0]["full_name"], "main.sales.raw");
        assert!(out["volumes"][0].get("owner").is_none());
        assert_eq!(
            mock.calls()[0].query,
            vec![
                ("catalog_name".to_string(), "main".to_string()),
                ("schema_name".to_string(), "sales".to_string())
            ]
        );
    }
}
