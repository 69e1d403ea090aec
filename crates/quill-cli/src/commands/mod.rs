//! Subcommand implementations.

pub mod chat;
pub mod config;

use anyhow::{Context, Result};
use quill_core::{ConfigValidation, EngineConfig};
use std::path::Path;

/// Load `path` (defaults when absent), apply `QUILL_*` overrides, validate.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let mut config = EngineConfig::load_or_default(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config
        .merge_with_env()
        .context("applying QUILL_* environment overrides")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}
