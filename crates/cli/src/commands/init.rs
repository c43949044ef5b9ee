//! `lakeclaw init`: write a default config file.

use lakeclaw_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("LakeClaw setup");
    println!("==============\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run init.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set DATABRICKS_HOST and DATABRICKS_TOKEN (or fill in [workspace])");
    println!("  2. Set an engine key, e.g. OPENAI_API_KEY, or use provider \"databricks\"");
    println!("  3. Try: lakeclaw call list_clusters");
    println!("  4. Then: lakeclaw chat");

    Ok(())
}
