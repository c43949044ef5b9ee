//! The conversation orchestrator.
//!
//! A four-state machine driving one run of a conversation:
//!
//! ```text
//! awaiting-engine --text--------> done (final-answer)
//!        |
//!      tools
//!        v
//! executing-tools --step limit--> failed (step-limit)
//!        |
//!        +-------> awaiting-engine
//!
//! engine fault   -> failed (fatal-error)
//! cancellation   -> failed (cancelled)
//! ```
//!
//! The step counter is bumped on every entry to `awaiting-engine`, so an
//! engine that never stops requesting tools is called exactly `max_steps`
//! times. Tool calls within one engine turn run one after another in the
//! order requested. Every tool outcome, failures included, is appended as a
//! tool-result turn.

use lakeclaw_config::AppConfig;
use lakeclaw_core::error::{ActionError, ErrorKind, ProviderError};
use lakeclaw_core::event::{DomainEvent, EventBus};
use lakeclaw_core::message::{Message, MessageToolCall, Role};
use lakeclaw_core::provider::{Provider, ProviderRequest, ProviderResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::ToolCatalog;
use crate::executor::{ActionExecutor, ActionOutcome};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful Databricks assistant. You help users work with their \
Databricks workspace through natural conversation.

You can call actions for clusters, jobs, SQL warehouses and statements, Unity Catalog and workspace files.

The session remembers a current workspace path, cluster, job and warehouse. When the user has set one, \
you may omit that argument and the session default is used. Use get_session_context to see them and the \
set_* actions when the user asks to switch.

If an action fails, read the error kind and message. Fix the arguments, ask the user, or explain what went wrong. \
Be concise and focus on what the user wants to accomplish.";

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    AwaitingEngine,
    ExecutingTools,
    Done,
    Failed,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    FinalAnswer,
    StepLimit,
    FatalError,
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinalAnswer => "final-answer",
            Self::StepLimit => "step-limit",
            Self::FatalError => "fatal-error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The turns of one conversation and where its current run stands.
///
/// Serializable so a client can hold on to it and continue later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: String,
    pub turns: Vec<Message>,
    pub step: u32,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
}

impl ConversationState {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turns: vec![Message::user(message)],
            step: 0,
            phase: Phase::AwaitingEngine,
            termination: None,
        }
    }

    /// Append a new user turn and reset the run bookkeeping.
    pub fn continue_with(mut self, message: impl Into<String>) -> Self {
        self.turns.push(Message::user(message));
        self.step = 0;
        self.phase = Phase::AwaitingEngine;
        self.termination = None;
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Failed)
    }

    /// Tool-result turns, in order.
    pub fn tool_results(&self) -> impl Iterator<Item = &Message> {
        self.turns.iter().filter(|m| m.role == Role::Tool)
    }
}

/// A failed tool call, kept for the user-facing reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub action: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// What a run produced. The state is returned whatever the reason, so
/// partial progress stays visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationOutcome {
    pub state: ConversationState,
    pub reason: TerminationReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failures from the last tool batch of the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_failures: Vec<ToolFailure>,
}

impl OrchestrationOutcome {
    pub fn steps(&self) -> u32 {
        self.state.step
    }

    /// Text for the user. Never empty, and always says how the run ended.
    pub fn reply(&self) -> String {
        match self.reason {
            TerminationReason::FinalAnswer => match self.answer.as_deref().map(str::trim) {
                Some(answer) if !answer.is_empty() => answer.to_string(),
                _ if !self.tool_failures.is_empty() => format!(
                    "The assistant gave no answer after these actions failed:\n{}",
                    self.failure_lines()
                ),
                _ => "The assistant returned an empty answer.".to_string(),
            },
            TerminationReason::StepLimit => {
                let mut reply = format!(
                    "Stopped after {} steps without a final answer. Try a narrower request.",
                    self.steps()
                );
                if !self.tool_failures.is_empty() {
                    reply.push_str("\nFailed actions in the last step:\n");
                    reply.push_str(&self.failure_lines());
                }
                reply
            }
            TerminationReason::FatalError => format!(
                "The conversation failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
            TerminationReason::Cancelled => "The conversation was cancelled.".to_string(),
        }
    }

    fn failure_lines(&self) -> String {
        self.tool_failures
            .iter()
            .map(|f| format!("- {} ({}): {}", f.action, f.kind, f.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Drives conversations against one engine and one executor.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    executor: Arc<ActionExecutor>,
    catalog: Arc<ToolCatalog>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_steps: u32,
    engine_timeout: Duration,
    system_prompt: String,
    events: Option<Arc<EventBus>>,
}

impl Orchestrator {
    /// `catalog` is what the engine is offered; calls to anything else are
    /// answered with not-found even if the executor could run them.
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<ActionExecutor>,
        catalog: Arc<ToolCatalog>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            executor,
            catalog,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_steps: 10,
            engine_timeout: Duration::from_secs(120),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            events: None,
        }
    }

    /// Model, sampling and limits from the loaded config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        executor: Arc<ActionExecutor>,
        catalog: Arc<ToolCatalog>,
        config: &AppConfig,
    ) -> Self {
        let mut orchestrator = Self::new(provider, executor, catalog, config.default_model.clone())
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_steps(config.agent.max_steps)
            .with_engine_timeout(config.agent.engine_timeout());
        if let Some(prompt) = &config.agent.system_prompt_override {
            orchestrator = orchestrator.with_system_prompt(prompt.clone());
        }
        orchestrator
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// At least one step always runs.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max.max(1);
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Start a fresh conversation and run it to the end.
    pub async fn chat(&self, session_id: &str, message: impl Into<String>) -> OrchestrationOutcome {
        self.run(ConversationState::new(message), session_id, &CancellationToken::new())
            .await
    }

    /// Run `state` until it reaches a terminal state.
    pub async fn run(
        &self,
        mut state: ConversationState,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> OrchestrationOutcome {
        // The configured prompt always leads; a caller-supplied one is dropped.
        let leading = state.turns.iter().take_while(|m| m.role == Role::System).count();
        let replaced = state
            .turns
            .splice(0..leading, [Message::system(&self.system_prompt)])
            .filter(|m| m.content != self.system_prompt)
            .count();
        if replaced > 0 {
            warn!(conversation_id = %state.id, replaced, "Dropping caller-supplied system turns");
        }
        state.phase = Phase::AwaitingEngine;
        state.termination = None;

        info!(
            conversation_id = %state.id,
            session_id,
            turns = state.turns.len(),
            max_steps = self.max_steps,
            "Starting conversation run"
        );

        let mut last_failures = Vec::new();

        loop {
            // awaiting-engine
            if cancel.is_cancelled() {
                return self.finish(state, session_id, TerminationReason::Cancelled, None, last_failures);
            }
            state.step += 1;

            let response = match self.ask_engine(&state, cancel).await {
                EngineReply::Response(response) => response,
                EngineReply::Cancelled => {
                    return self.finish(state, session_id, TerminationReason::Cancelled, None, last_failures);
                }
                EngineReply::Fault(err) => {
                    warn!(
                        conversation_id = %state.id,
                        step = state.step,
                        error = %err,
                        "Engine call failed"
                    );
                    return self.finish(
                        state,
                        session_id,
                        TerminationReason::FatalError,
                        Some(err.to_string()),
                        last_failures,
                    );
                }
            };

            if let Some(events) = &self.events {
                events.publish(DomainEvent::EngineResponded {
                    conversation_id: state.id.clone(),
                    model: response.model.clone(),
                    step: state.step,
                    tool_calls: response.message.tool_calls.len(),
                    tokens_used: response.usage.as_ref().map(|u| u.total_tokens),
                    timestamp: chrono::Utc::now(),
                });
            }

            if response.message.tool_calls.is_empty() {
                state.turns.push(response.message);
                return self.finish(state, session_id, TerminationReason::FinalAnswer, None, last_failures);
            }

            // executing-tools
            state.phase = Phase::ExecutingTools;
            let calls = response.message.tool_calls.clone();
            state.turns.push(response.message);
            last_failures.clear();

            debug!(
                conversation_id = %state.id,
                step = state.step,
                tool_count = calls.len(),
                "Executing tool calls"
            );

            for (i, call) in calls.iter().enumerate() {
                if cancel.is_cancelled() {
                    for skipped in &calls[i..] {
                        state.turns.push(Message::tool_result(&skipped.id, skipped_content(skipped)));
                    }
                    return self.finish(state, session_id, TerminationReason::Cancelled, None, last_failures);
                }

                let outcome = self.invoke(session_id, call).await;
                if let Err(err) = &outcome.result {
                    last_failures.push(ToolFailure {
                        action: outcome.action.clone(),
                        kind: err.kind,
                        message: err.message.clone(),
                    });
                }
                state.turns.push(Message::tool_result(&call.id, outcome.to_tool_content()));
            }

            if state.step >= self.max_steps {
                warn!(
                    conversation_id = %state.id,
                    steps = state.step,
                    "Step limit reached without a final answer"
                );
                return self.finish(state, session_id, TerminationReason::StepLimit, None, last_failures);
            }
            state.phase = Phase::AwaitingEngine;
        }
    }

    async fn ask_engine(&self, state: &ConversationState, cancel: &CancellationToken) -> EngineReply {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: state.turns.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.catalog.definitions().to_vec(),
        };
        debug!(
            conversation_id = %state.id,
            step = state.step,
            provider = self.provider.name(),
            "Calling engine"
        );

        // The engine call has no side effects, so it can be abandoned mid-flight.
        tokio::select! {
            _ = cancel.cancelled() => EngineReply::Cancelled,
            result = tokio::time::timeout(self.engine_timeout, self.provider.complete(request)) => match result {
                Ok(Ok(response)) => EngineReply::Response(response),
                Ok(Err(err)) => EngineReply::Fault(err),
                Err(_) => EngineReply::Fault(ProviderError::Timeout(format!(
                    "no engine response within {:?}",
                    self.engine_timeout
                ))),
            },
        }
    }

    async fn invoke(&self, session_id: &str, call: &MessageToolCall) -> ActionOutcome {
        if !self.catalog.declares(&call.name) {
            debug!(action = %call.name, "Engine called a tool it was not offered");
            return ActionOutcome::failed(
                &call.name,
                Value::String(call.arguments.clone()),
                ActionError::not_found(format!("'{}' is not an available tool", call.name)),
            );
        }
        let raw = call.arguments.trim();
        if raw.is_empty() {
            return self.executor.execute(session_id, &call.name, json!({})).await;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(arguments) => self.executor.execute(session_id, &call.name, arguments).await,
            Err(e) => {
                debug!(action = %call.name, error = %e, "Tool call arguments are not valid JSON");
                ActionOutcome::failed(
                    &call.name,
                    Value::String(call.arguments.clone()),
                    ActionError::validation(format!("arguments are not valid JSON: {e}")),
                )
            }
        }
    }

    fn finish(
        &self,
        mut state: ConversationState,
        session_id: &str,
        reason: TerminationReason,
        error: Option<String>,
        tool_failures: Vec<ToolFailure>,
    ) -> OrchestrationOutcome {
        state.phase = match reason {
            TerminationReason::FinalAnswer => Phase::Done,
            _ => Phase::Failed,
        };
        state.termination = Some(reason);

        let answer = match reason {
            TerminationReason::FinalAnswer => state
                .turns
                .last()
                .filter(|m| m.role == Role::Assistant)
                .map(|m| m.content.clone()),
            _ => None,
        };

        info!(
            conversation_id = %state.id,
            session_id,
            reason = %reason,
            steps = state.step,
            turns = state.turns.len(),
            "Conversation run finished"
        );

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ConversationFinished {
                conversation_id: state.id.clone(),
                session_id: session_id.to_string(),
                reason: reason.as_str().to_string(),
                steps: state.step,
                timestamp: chrono::Utc::now(),
            });
        }

        OrchestrationOutcome {
            state,
            reason,
            answer,
            error,
            tool_failures,
        }
    }
}

enum EngineReply {
    Response(ProviderResponse),
    Fault(ProviderError),
    Cancelled,
}

fn skipped_content(call: &MessageToolCall) -> String {
    json!({
        "action": call.name,
        "status": "skipped",
        "reason": "conversation cancelled before this call ran",
    })
    .to_string()
}
