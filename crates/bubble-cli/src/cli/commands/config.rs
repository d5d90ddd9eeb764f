//! Config command handlers.

use anyhow::{Context, Result, bail};
use bubble_core::config;

pub fn path() {
    println!("{}", config::paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    config::Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn set_key(key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        bail!("api key must not be empty");
    }
    let config_path = config::paths::config_path();
    config::Config::save_api_key(key)
        .with_context(|| format!("save api key to {}", config_path.display()))?;
    println!("Saved api key to {}", config_path.display());
    Ok(())
}
