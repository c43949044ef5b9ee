//! Job and job-run actions.

use lakeclaw_core::action::{Action, ParamSpec, SideEffect};
use lakeclaw_core::resolve::ResolvedCall;
use lakeclaw_core::session::SessionField;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::client::WorkspaceApi;
use crate::rest::{RestAction, acknowledge};

fn job_id() -> ParamSpec {
    ParamSpec::integer("job_id", "Job ID. Defaults to the session's current job.")
        .required()
        .bind(SessionField::CurrentJobId)
}

fn run_id() -> ParamSpec {
    ParamSpec::integer("run_id", "Run ID returned by run_job.").required()
}

pub fn actions(api: &Arc<dyn WorkspaceApi>) -> Vec<Arc<dyn Action>> {
    vec![
        RestAction::get(api, "list_jobs", "/api/2.1/jobs/list")
            .describe("List jobs in the workspace.")
            .query(ParamSpec::integer("limit", "Maximum number of jobs to return (1-100).").default_value(25))
            .query(ParamSpec::string("name", "Only jobs with exactly this name."))
            .shape(summarize_jobs)
            .into_action(),
        RestAction::get(api, "get_job", "/api/2.1/jobs/get")
            .describe("Get the settings of one job.")
            .query(job_id())
            .into_action(),
        RestAction::post(api, "run_job", "/api/2.1/jobs/run-now")
            .describe("Trigger a run of a job now. Returns the run ID.")
            .body(job_id())
            .body(ParamSpec::object(
                "job_parameters",
                "Job-level parameter overrides as a name to value map.",
            ))
            .into_action(),
        RestAction::get(api, "get_run", "/api/2.1/jobs/runs/get")
            .describe("Get the state and result of one job run.")
            .query(run_id())
            .shape(summarize_run)
            .into_action(),
        RestAction::post(api, "cancel_run", "/api/2.1/jobs/runs/cancel")
            .describe("Cancel a job run. Cancellation is asynchronous.")
            .body(run_id())
            .side_effect(SideEffect::Destructive)
            .shape(cancelling)
            .into_action(),
        RestAction::post(api, "delete_job", "/api/2.1/jobs/delete")
            .describe("Delete a job and its run history. This cannot be undone.")
            .body(job_id())
            .side_effect(SideEffect::Destructive)
            .shape(|call, resp| acknowledge(call, resp, "deleted"))
            .into_action(),
    ]
}

fn summarize_jobs(_: &ResolvedCall, resp: Value) -> Value {
    let jobs: Vec<Value> = resp
        .get("jobs")
        .and_then(Value::as_array)
        .map(|jobs| {
            jobs.iter()
                .map(|job| {
                    json!({
                        "job_id": job.get("job_id"),
                        "name": job.pointer("/settings/name"),
                        "creator_user_name": job.get("creator_user_name"),
                        "created_time": job.get("created_time"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    json!({
        "count": jobs.len(),
        "jobs": jobs,
        "has_more": resp.get("has_more").cloned().unwrap_or(Value::Bool(false)),
    })
}

fn summarize_run(_: &ResolvedCall, resp: Value) -> Value {
    json!({
        "run_id": resp.get("run_id"),
        "job_id": resp.get("job_id"),
        "run_name": resp.get("run_name"),
        "life_cycle_state": resp.pointer("/state/life_cycle_state"),
        "result_state": resp.pointer("/state/result_state"),
        "state_message": resp.pointer("/state/state_message"),
        "start_time": resp.get("start_time"),
        "end_time": resp.get("end_time"),
        "run_page_url": resp.get("run_page_url"),
    })
}

fn cancelling(call: &ResolvedCall, resp: Value) -> Value {
    acknowledge(call, resp, "cancelling")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWorkspaceApi;
    use crate::test_support::{run, session_with};
    use lakeclaw_core::error::ErrorKind;

    #[tokio::test]
    async fn run_job_parses_session_job_id() {
        let mock = Arc::new(MockWorkspaceApi::new());
        mock.respond("/api/2.1/jobs/run-now", json!({"run_id": 7001}));
        let out = run(
            mock.clone(),
            "run_job",
            json!({}),
            Some(session_with(SessionField::CurrentJobId, "123")),
        )
        .await
        .unwrap();
        assert_eq!(out["run_id"], 7001);
        assert_eq!(mock.calls()[0].body, Some(json!({"job_id": 123})));
    }

    #[tokio::test]
    async fn unparseable_session_job_id_is_validation() {
        let mock = Arc::new(MockWorkspaceApi::new());
        let err = run(
            mock.clone(),
            "get_job",
            json!({}),
            Some(session_with(SessionField::CurrentJobId, "nightly")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.param.as_deref(), Some("job_id"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn list_jobs_sends_default_limit() {
        let mock = Arc::new(MockWorkspaceApi::new());
        mock.respond(
            "/api/2.1/jobs/list",
            json!({"jobs": [{"job_id": 1, "settings": {"name": "etl"}}], "has_more": false}),
        );
        let out = run(mock.clone(), "list_jobs", json!({}), None).await.unwrap();
        assert_eq!(out["jobs"][0]["name"], "etl");
        assert_eq!(
            mock.calls()[0].query,
            vec![("limit".to_string(), "25".to_string())]
        );
    }

    #[tokio::test]
    async fn get_run_flattens_state() {
        let mock = Arc::new(MockWorkspaceApi::new());
        mock.respond(
            "/api/2.1/jobs/runs/get",
            json!({"run_id": 5, "state": {"life_cycle_state": "TERMINATED", "result_state": "SUCCESS"}}),
        );
        let out = run(mock, "get_run", json!({"run_id": "5"}), None).await.unwrap();
        assert_eq!(out["result_state"], "SUCCESS");
    }

    #[tokio::test]
    async fn delete_job_uses_session_job() {
        let mock = Arc::new(MockWorkspaceApi::new());
        let out = run(
            mock.clone(),
            "delete_job",
            json!({}),
            Some(session_with(SessionField::CurrentJobId, "77")),
        )
        .await
        .unwrap();
        assert_eq!(out["status"], "deleted");
        assert_eq!(mock.calls()[0].path, "/api/2.1/jobs/delete");
        assert_eq!(mock.calls()[0].body, Some(json!({"job_id": 77})));
    }
}
