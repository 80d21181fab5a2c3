//! `sleuth serve`: Start the HTTP streaming gateway.

use sleuth_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    require_api_key(&config)?;

    println!("🔎 Sleuth Gateway");
    println!("   Listening:   http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:       {}/{}", config.default_provider, config.default_model);
    println!("   Search:      {}", config.search.backend);
    println!("   Checkpoints: {}", config.checkpoint.backend);

    sleuth_gateway::start(config).await?;

    Ok(())
}

/// Fail early with setup instructions when a hosted model has no API key.
pub fn require_api_key(config: &AppConfig) -> Result<(), String> {
    let local = matches!(config.default_provider.as_str(), "ollama" | "vllm");
    if local || config.has_api_key() {
        return Ok(());
    }
    Err(format!(
        "No API key configured for '{}'. Set SLEUTH_API_KEY or OPENAI_API_KEY, or add `api_key` to {}",
        config.default_provider,
        AppConfig::config_dir().join("config.toml").display()
    ))
}
