mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config.object_store.apply_env();
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./imgshift.toml",
        "./config.toml",
        "~/.config/imgshift/config.toml",
        "/etc/imgshift/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    config.object_store.apply_env();
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.migrate.page_size == 0 {
        anyhow::bail!("migrate.page_size cannot be 0");
    }
    if config.migrate.batch_size == 0 {
        anyhow::bail!("migrate.batch_size cannot be 0");
    }
    if config.migrate.concurrency == 0 {
        anyhow::bail!("migrate.concurrency cannot be 0");
    }

    if config.database.path.as_os_str().is_empty() {
        anyhow::bail!("database.path cannot be empty");
    }

    // A half-filled object_store section is almost always a typo; a missing
    // one just means only local commands will work.
    if config.object_store.is_configured() {
        if let Err(e) = config.object_store.ensure_complete() {
            tracing::warn!("{}", e);
        }
    }

    Ok(())
}
