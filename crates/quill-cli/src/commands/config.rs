//! `quill config`

use anyhow::Result;
use quill_core::EngineConfig;

/// Print the effective configuration.
pub fn run(config: &EngineConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
