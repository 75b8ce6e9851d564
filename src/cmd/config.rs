//! Configuration view - `commitment config`.

use anyhow::Result;
use commitment::config::HostConfig;

use super::super::ConfigCommands;

pub fn cmd_config(command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show { config } => {
            let host = HostConfig::load(config.as_deref())?;
            print!("{}", host.to_toml()?);
        }
    }
    Ok(())
}
