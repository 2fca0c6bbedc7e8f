pub mod server_config;

pub use server_config::ServerConfig;

use anyhow::{Context, Result};
use std::path::Path;

/// Load server configuration from a YAML file
pub fn load_config(path: &Path) -> Result<ServerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: ServerConfig =
        serde_yaml::from_str(&content).with_context(|| "Failed to parse YAML config file")?;

    Ok(config)
}
