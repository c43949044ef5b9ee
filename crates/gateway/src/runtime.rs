//! Assembly of the shared subsystems.
//!
//! Built once per process and shared behind an `Arc` by the HTTP routes and
//! the CLI commands.

use lakeclaw_actions::{RestWorkspaceClient, WorkspaceApi};
use lakeclaw_agent::{ActionExecutor, Orchestrator, ToolCatalog};
use lakeclaw_config::AppConfig;
use lakeclaw_core::error::RegistryError;
use lakeclaw_core::event::EventBus;
use lakeclaw_core::provider::Provider;
use lakeclaw_session::InMemorySessionStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(
        "Workspace not configured. Set DATABRICKS_HOST and DATABRICKS_TOKEN, \
         or add a [workspace] section to ~/.lakeclaw/config.toml (run `lakeclaw init`)."
    )]
    WorkspaceNotConfigured,

    #[error("Invalid action catalog: {0}")]
    Registry(#[from] RegistryError),
}

/// Everything a request needs: the session store, the executor and, when an
/// engine is configured, the orchestrator.
pub struct Runtime {
    pub config: AppConfig,
    pub events: Arc<EventBus>,
    pub sessions: Arc<InMemorySessionStore>,
    pub executor: Arc<ActionExecutor>,
    pub catalog: Arc<ToolCatalog>,
    pub orchestrator: Option<Arc<Orchestrator>>,
}

impl Runtime {
    /// Build against the real workspace and the configured engine.
    pub fn from_config(config: AppConfig) -> Result<Self, SetupError> {
        let client = RestWorkspaceClient::from_config(&config.workspace)
            .ok_or(SetupError::WorkspaceNotConfigured)?;
        info!(workspace = %client.base_url(), "Workspace client ready");

        let providers = lakeclaw_providers::router::build_from_config(&config);
        let provider = match providers.require_default() {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!(error = %e, "No reasoning engine available; chat is disabled");
                None
            }
        };

        Ok(Self::assemble(config, Arc::new(client), provider)?)
    }

    /// Build from explicit collaborators. Tests pass mocks here.
    pub fn assemble(
        config: AppConfig,
        api: Arc<dyn WorkspaceApi>,
        provider: Option<Arc<dyn Provider>>,
    ) -> Result<Self, RegistryError> {
        let events = Arc::new(EventBus::default());
        let sessions = Arc::new(
            InMemorySessionStore::new()
                .with_ttl(config.session.ttl())
                .with_event_bus(events.clone()),
        );

        let registry = Arc::new(lakeclaw_actions::default_registry(api)?);
        let catalog = Arc::new(ToolCatalog::build(&registry));
        let executor = Arc::new(
            ActionExecutor::from_config(registry, sessions.clone(), &config.agent)
                .with_event_bus(events.clone()),
        );

        let orchestrator = provider.map(|provider| {
            Arc::new(
                Orchestrator::from_config(provider, executor.clone(), catalog.clone(), &config)
                    .with_event_bus(events.clone()),
            )
        });

        info!(
            actions = executor.registry().len(),
            tools = catalog.len(),
            engine = orchestrator.is_some(),
            "Runtime assembled"
        );

        Ok(Self {
            config,
            events,
            sessions,
            executor,
            catalog,
            orchestrator,
        })
    }

    /// Start the idle-session sweeper, unless eviction is disabled.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.config.session.ttl_secs == 0 {
            return None;
        }
        Some(
            self.sessions
                .clone()
                .spawn_sweeper(self.config.session.sweep_interval(), cancel),
        )
    }
}
