//! Config file loading and CLI overrides.

use std::path::{Path, PathBuf};
use validator::Validate;

use tokenguard_types::{ConfigError, GatewayConfig};

use crate::cli::Cli;

const DEFAULT_CONFIG_FILE: &str = "tokenguard.json";

/// Resolve the config path: explicit flag, else `tokenguard.json` when present.
fn config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(path) = &cli.config {
        return Some(path.clone());
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
    fallback.exists().then_some(fallback)
}

pub fn read_config_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::from_io_error(&path.display().to_string(), &e))?;
    serde_json::from_str(&content).map_err(|e| ConfigError::from_json_error(&e))
}

fn apply_overrides(config: &mut GatewayConfig, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = &cli.upstream {
        config.upstream.url.clone_from(url);
    }
    if let Some(backend) = cli.storage {
        config.storage.backend = backend;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(file) = &cli.log_file {
        config.logging.file = Some(file.clone());
    }
}

/// File values, then CLI/env overrides, then validation.
pub fn load_config(cli: &Cli) -> Result<GatewayConfig, ConfigError> {
    let mut config = match config_path(cli) {
        Some(path) => read_config_file(&path)?,
        None => GatewayConfig::default(),
    };
    apply_overrides(&mut config, cli);
    config.validate().map_err(|e| ConfigError::from_validation(&e))?;
    Ok(config)
}
