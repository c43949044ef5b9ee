//! # LakeClaw Core
//!
//! Domain types, traits, and error definitions for the LakeClaw workspace agent.
//! No HTTP or engine code lives here.
//!
//! The seams are traits: [`Action`] for workspace operations, [`Provider`]
//! for reasoning engines and [`SessionStore`] for per-session defaults.
//! Implementations live in their own crates and depend inward on this one.

pub mod action;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod resolve;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use action::{
    Action, ActionContext, ActionDescriptor, ActionRegistry, ParamSpec, ParamType, SideEffect,
};
pub use error::{ActionError, ErrorKind, ProviderError, RegistryError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use resolve::{ContextResolver, Provenance, ResolvedCall};
pub use session::{SessionField, SessionRecord, SessionStore};
