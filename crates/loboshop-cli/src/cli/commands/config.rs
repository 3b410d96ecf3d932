//! Config command handlers.

use anyhow::{Context, Result};
use loboshop_core::config::{self, paths};

pub fn path() {
    println!("{}", paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = paths::config_path();
    config::Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

/// Prints the configuration in effect, with the base URL override applied.
pub fn show(config: &config::Config) -> Result<()> {
    let effective = config::Config {
        base_url: config.effective_base_url()?,
        ..config.clone()
    };
    print!("{}", toml::to_string_pretty(&effective).context("render config")?);
    Ok(())
}
