//! Session storage for LakeClaw.
//!
//! All session stores implement `lakeclaw_core::SessionStore`. The in-memory
//! store is the only one today; sessions are cheap to rebuild, so nothing is
//! persisted across restarts.

pub mod in_memory;

pub use in_memory::InMemorySessionStore;
