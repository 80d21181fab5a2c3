//! `sleuth config`: Show the effective configuration.

use sleuth_config::AppConfig;

pub fn run(path_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path_only {
        println!("{}", AppConfig::config_dir().join("config.toml").display());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    print!("{}", config.to_redacted_toml());
    Ok(())
}
