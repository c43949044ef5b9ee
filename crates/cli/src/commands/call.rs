//! `lakeclaw call`: invoke one action directly.
//!
//! Sessions live in process memory, so `--session` only groups calls made
//! within a single invocation; a fresh process starts with empty sessions.

use lakeclaw_gateway::Runtime;
use serde_json::Value;

pub async fn run(action: String, args: String, session: String) -> Result<(), Box<dyn std::error::Error>> {
    let arguments: Value =
        serde_json::from_str(&args).map_err(|e| format!("--args is not valid JSON: {e}"))?;

    let runtime = Runtime::from_config(super::load_config()?)?;
    let outcome = runtime.executor.execute(&session, &action, arguments).await;

    println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);

    match outcome.error() {
        Some(err) => Err(format!("{action} failed ({})", err.kind).into()),
        None => Ok(()),
    }
}
