//! `cfgtrail config` command implementation.

use anyhow::Result;

use cfgtrail_core::TrailConfig;

/// Print the resolved configuration as YAML.
pub fn run_config(config: &TrailConfig) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}
