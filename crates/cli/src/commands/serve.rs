//! `lakeclaw serve`: start the HTTP gateway.

use lakeclaw_gateway::Runtime;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let runtime = Arc::new(Runtime::from_config(config)?);
    println!(
        "LakeClaw gateway on http://{}:{} ({} actions, chat {})",
        runtime.config.gateway.host,
        runtime.config.gateway.port,
        runtime.executor.registry().len(),
        if runtime.orchestrator.is_some() { "enabled" } else { "disabled" },
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal.cancel();
        }
    });

    lakeclaw_gateway::start(runtime, shutdown).await
}
