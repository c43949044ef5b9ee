//! The agent core of LakeClaw.
//!
//! - [`executor`]: resolves and runs one action, shaping every failure into
//!   the error taxonomy.
//! - [`bridge`]: turns action descriptors into engine tool declarations.
//! - [`orchestrator`]: the bounded loop that sends the conversation to the
//!   engine, runs the actions it asks for and feeds the results back.
//!
//! The loop stops on a text-only answer, on the step limit, on an engine
//! fault or on cancellation. Tool failures never stop it.

pub mod bridge;
pub mod executor;
pub mod orchestrator;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use bridge::{ExcludedAction, ToolCatalog, ToolFormat};
pub use executor::{ActionExecutor, ActionOutcome};
pub use orchestrator::{
    ConversationState, OrchestrationOutcome, Orchestrator, Phase, TerminationReason, ToolFailure,
};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedProvider;
