//! Recording stand-in for the remote workspace, for tests.

use async_trait::async_trait;
use lakeclaw_core::error::ActionError;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::client::WorkspaceApi;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct Script {
    sticky: HashMap<String, Result<Value, ActionError>>,
    once: HashMap<String, VecDeque<Result<Value, ActionError>>>,
}

/// Answers by path: queued one-shot results first, then the sticky result
/// for that path, then `{}`. Every call is recorded.
#[derive(Default)]
pub struct MockWorkspaceApi {
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockWorkspaceApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, value: Value) {
        self.lock_script().sticky.insert(path.to_string(), Ok(value));
    }

    pub fn fail(&self, path: &str, error: ActionError) {
        self.lock_script().sticky.insert(path.to_string(), Err(error));
    }

    /// Fail the next call to `path` only.
    pub fn fail_once(&self, path: &str, error: ActionError) {
        self.lock_script()
            .once
            .entry(path.to_string())
            .or_default()
            .push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Script> {
        // A poisoned mock only means another test thread panicked
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn answer(&self, call: RecordedCall) -> Result<Value, ActionError> {
        let path = call.path.clone();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        let mut script = self.lock_script();
        if let Some(next) = script.once.get_mut(&path).and_then(VecDeque::pop_front) {
            return next;
        }
        script
            .sticky
            .get(&path)
            .cloned()
            .unwrap_or_else(|| Ok(Value::Object(Default::default())))
    }
}

#[async_trait]
impl WorkspaceApi for MockWorkspaceApi {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ActionError> {
        self.answer(RecordedCall {
            method: "GET",
            path: path.to_string(),
            query: query.to_vec(),
            body: None,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ActionError> {
        self.answer(RecordedCall {
            method: "POST",
            path: path.to_string(),
            query: Vec::new(),
            body: Some(body),
        })
    }
}
