//! Provider router: selects the reasoning engine based on config.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use lakeclaw_core::error::ProviderError;
use lakeclaw_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// The default provider, or `NotConfigured` naming what is missing.
    pub fn require_default(&self) -> Result<Arc<dyn Provider>, ProviderError> {
        self.default().ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "provider '{}' has no endpoint; set [workspace] host/token or [providers.{}]",
                self.default_provider, self.default_provider
            ))
        })
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }
}

/// Build providers from configuration.
///
/// The `databricks` provider talks to the workspace's model serving
/// endpoints and authenticates with the workspace token unless an explicit
/// key is configured.
pub fn build_from_config(config: &lakeclaw_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);
    let timeout = config.agent.engine_timeout();

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = match provider_config.api_url.clone() {
            Some(url) => url,
            None => match default_base_url(name, config) {
                Some(url) => url,
                None => {
                    warn!(provider = %name, "No endpoint for provider, skipping");
                    continue;
                }
            },
        };

        let provider: Arc<dyn Provider> = if name == "anthropic" {
            let mut p = AnthropicProvider::new(&api_key).with_timeout(timeout);
            if provider_config.api_url.is_some() {
                p = p.with_base_url(&base_url);
            }
            Arc::new(p)
        } else {
            Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key).with_timeout(timeout))
        };

        router.register(name.clone(), provider);
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.engine_api_key().unwrap_or_default();

        let provider: Option<Arc<dyn Provider>> = match config.default_provider.as_str() {
            "anthropic" => Some(Arc::new(AnthropicProvider::new(&api_key).with_timeout(timeout))),
            "databricks" => config.workspace.base_url().map(|host| {
                Arc::new(OpenAiCompatProvider::databricks(&host, &api_key).with_timeout(timeout)) as _
            }),
            other => default_base_url(other, config).map(|url| {
                Arc::new(OpenAiCompatProvider::new(other, &url, &api_key).with_timeout(timeout)) as _
            }),
        };

        match provider {
            Some(p) => router.register(config.default_provider.clone(), p),
            None => warn!(
                provider = %config.default_provider,
                "Default provider has no endpoint configured"
            ),
        }
    }

    router
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str, config: &lakeclaw_config::AppConfig) -> Option<String> {
    let url = match provider_name {
        "databricks" => {
            return config
                .workspace
                .base_url()
                .map(|host| format!("{host}/serving-endpoints"));
        }
        "openrouter" => "https://openrouter.ai/api/v1",
        "openai" => "https://api.openai.com/v1",
        "anthropic" => "https://api.anthropic.com",
        "ollama" => "http://localhost:11434/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "vllm" => "http://localhost:8000/v1",
        _ => return None,
    };
    Some(url.to_string())
}
