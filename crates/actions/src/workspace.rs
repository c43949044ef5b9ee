//! Workspace file-tree actions (notebooks, files, directories), plus
//! one-off notebook runs.
//!
//! Paths are workspace-relative: a path without a leading `/` is joined onto
//! the session's workspace path before the request goes out.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lakeclaw_core::action::{Action, ParamSpec, SideEffect};
use lakeclaw_core::resolve::ResolvedCall;
use lakeclaw_core::session::SessionField;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::client::WorkspaceApi;
use crate::rest::{RestAction, acknowledge, summarize_list};

fn target_path(description: &'static str) -> ParamSpec {
    ParamSpec::string("path", description)
        .required()
        .workspace_relative()
}

pub fn actions(api: &Arc<dyn WorkspaceApi>) -> Vec<Arc<dyn Action>> {
    vec![
        RestAction::get(api, "list_workspace", "/api/2.0/workspace/list")
            .describe("List notebooks, files and folders under a workspace path.")
            .query(
                ParamSpec::string(
                    "path",
                    "Folder to list. Relative paths resolve against the session's workspace path.",
                )
                .default_value("/Workspace")
                .bind(SessionField::WorkspacePath)
                .workspace_relative(),
            )
            .shape(|_, resp| summarize_list(&resp, "objects", &["path", "object_type", "language"]))
            .into_action(),
        RestAction::get(api, "export_file", "/api/2.0/workspace/export")
            .describe("Export the contents of a notebook or file.")
            .query(target_path("Notebook or file to export."))
            .query(
                ParamSpec::string("format", "Export format.")
                    .one_of(&["SOURCE", "HTML", "JUPYTER", "DBC"])
                    .default_value("SOURCE"),
            )
            .shape(decode_export)
            .into_action(),
        RestAction::post(api, "mkdirs", "/api/2.0/workspace/mkdirs")
            .describe("Create a folder, including missing parents. Succeeds if it already exists.")
            .body(target_path("Folder to create."))
            .shape(|call, resp| acknowledge(call, resp, "created"))
            .into_action(),
        RestAction::post(api, "delete_path", "/api/2.0/workspace/delete")
            .describe("Delete a notebook, file or folder. Non-empty folders need recursive=true.")
            .body(target_path("Object to delete."))
            .body(ParamSpec::boolean("recursive", "Delete folder contents too.").default_value(false))
            .side_effect(SideEffect::Destructive)
            .shape(|call, resp| acknowledge(call, resp, "deleted"))
            .into_action(),
        RestAction::post(api, "import_file", "/api/2.0/workspace/import")
            .describe("Write a notebook or file into the workspace from text content.")
            .body(target_path("Destination path."))
            .body(ParamSpec::string("content", "File content as plain text.").required())
            .body(
                ParamSpec::string("format", "Import format. AUTO detects notebooks by extension.")
                    .one_of(&["AUTO", "SOURCE", "HTML", "JUPYTER", "DBC"])
                    .default_value("AUTO"),
            )
            .body(ParamSpec::boolean("overwrite", "Replace an existing object.").default_value(false))
            .build_body(encode_import)
            .shape(|call, _| json!({"path": call.str("path"), "status": "imported"}))
            .into_action(),
        RestAction::post(api, "run_notebook", "/api/2.1/jobs/runs/submit")
            .describe("Run a notebook once on an existing cluster without creating a job. Returns the run ID.")
            .body(target_path("Notebook to run."))
            .body(
                ParamSpec::string("cluster_id", "Cluster to run on. Defaults to the session's current cluster.")
                    .required()
                    .bind(SessionField::CurrentClusterId),
            )
            .body(ParamSpec::integer("timeout_seconds", "Cancel the run after this many seconds.").default_value(3600))
            .body(ParamSpec::object("notebook_params", "Notebook widget values as a name to value map."))
            .build_body(submit_notebook_run)
            .shape(submitted)
            .into_action(),
    ]
}

/// The import endpoint takes base64 content.
fn encode_import(_: &ResolvedCall, mut body: Map<String, Value>) -> Value {
    if let Some(Value::String(text)) = body.get("content") {
        let encoded = STANDARD.encode(text.as_bytes());
        body.insert("content".into(), Value::String(encoded));
    }
    Value::Object(body)
}

/// A single-task run submission.
fn submit_notebook_run(call: &ResolvedCall, body: Map<String, Value>) -> Value {
    let path = call.str("path").unwrap_or_default();
    let mut notebook_task = json!({"notebook_path": path, "source": "WORKSPACE"});
    if let Some(params) = body.get("notebook_params") {
        notebook_task["base_parameters"] = params.clone();
    }
    json!({
        "run_name": format!("Notebook run: {path}"),
        "timeout_seconds": body.get("timeout_seconds"),
        "tasks": [{
            "task_key": "notebook",
            "existing_cluster_id": body.get("cluster_id"),
            "notebook_task": notebook_task,
        }],
    })
}

fn submitted(call: &ResolvedCall, resp: Value) -> Value {
    json!({
        "run_id": resp.get("run_id"),
        "path": call.str("path"),
        "cluster_id": call.get("cluster_id"),
        "status": "submitted",
    })
}

/// Exports come back base64-encoded; hand the engine readable text when
/// the bytes are UTF-8.
fn decode_export(call: &ResolvedCall, resp: Value) -> Value {
    let encoded = resp.get("content").and_then(Value::as_str).unwrap_or_default();
    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());

    match decoded {
        Some(text) => json!({
            "path": call.str("path"),
            "format": call.str("format"),
            "file_type": resp.get("file_type"),
            "content": text,
        }),
        None => json!({
            "path": call.str("path"),
            "format": call.str("format"),
            "file_type": resp.get("file_type"),
            "content_base64": encoded,
        }),
    }
}
