use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::{load_config, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config YAML file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Service address, overrides the config file
    #[arg(long)]
    pub http_addr: Option<String>,

    /// Enable debug logging for internal details
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Merge the optional config file with command line overrides
    pub fn resolve_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };
        if let Some(addr) = &self.http_addr {
            config.http_addr = addr.clone();
        }
        Ok(config)
    }
}
