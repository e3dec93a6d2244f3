//! Configuration loading

use anyhow::Result;
use tracing::info;

use crate::Config;

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. `AGORA_CONFIG_PATH` environment variable (explicit path)
/// 2. ./config.yaml (current working directory)
/// 3. /config/config.yaml (container mount path)
/// 4. Fall back to environment variables only
pub fn load_config() -> Result<Config> {
    let config_path = std::env::var("AGORA_CONFIG_PATH")
        .ok()
        .filter(|p| std::path::Path::new(p).exists())
        .or_else(|| {
            ["config.yaml", "/config/config.yaml"]
                .into_iter()
                .find(|p| std::path::Path::new(p).exists())
                .map(str::to_string)
        });

    let config = match config_path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
        }
        None => Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config from environment: {e}");
            eprintln!("Using default configuration");
            Config::default()
        }),
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            tracing::error!("Config validation error: {}", error);
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!(
        cascade_global_edits = config.permissions.cascade_global_edits,
        unknown_action_policy = ?config.permissions.unknown_action_policy,
        batch_max_passes = config.permissions.batch_max_passes,
        "Configuration loaded and validated"
    );

    Ok(config)
}
