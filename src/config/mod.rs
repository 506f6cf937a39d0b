mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

use crate::metadata::fields::FieldPolicy;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./tapedeck.toml",
        "~/.config/tapedeck/config.toml",
        "/etc/tapedeck/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

impl Config {
    /// Build the effective per-field priority policy.
    pub fn field_policy(&self) -> Result<FieldPolicy> {
        FieldPolicy::new(
            &self.priority.general,
            &self.priority.identifiers,
            &self.priority.fields,
        )
        .context("Invalid [priority] configuration")
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.reconcile.fan_out == 0 {
        anyhow::bail!("reconcile.fan_out must be at least 1");
    }
    if config.reconcile.call_timeout_secs == 0 {
        anyhow::bail!("reconcile.call_timeout_secs must be at least 1");
    }

    config.field_policy()?;

    for (name, ingest) in [("scrape", &config.providers.scrape), ("probe", &config.providers.probe)] {
        if !ingest.enabled {
            continue;
        }
        match &ingest.dir {
            None => anyhow::bail!("Provider '{}' is enabled but has no dir", name),
            Some(dir) if !dir.is_dir() => {
                tracing::warn!("Ingest directory for '{}' does not exist: {:?}", name, dir)
            }
            Some(_) => {}
        }
    }

    Ok(())
}
