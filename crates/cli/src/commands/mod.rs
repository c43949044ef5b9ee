pub mod actions;
pub mod call;
pub mod chat;
pub mod init;
pub mod serve;

use lakeclaw_config::AppConfig;

/// Load config with a readable error.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}
