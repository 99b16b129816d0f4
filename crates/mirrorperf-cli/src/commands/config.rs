use anyhow::{bail, Context, Result};
use colored::Colorize;
use mirrorperf_config::HarnessConfig;
use std::path::PathBuf;

use super::{load_config, Exit};
use crate::cli::ConfigCommands;

/// Execute config subcommand
pub async fn execute(explicit: Option<PathBuf>, cmd: ConfigCommands) -> Result<Exit> {
    match cmd {
        ConfigCommands::Init { path, force } => init(path, force),
        ConfigCommands::Show { format } => show(explicit, &format),
    }
}

/// Write a default config file
fn init(path: Option<PathBuf>, force: bool) -> Result<Exit> {
    let config_path = path
        .or_else(HarnessConfig::default_path)
        .context("Could not determine config file path")?;

    if config_path.exists() && !force {
        println!(
            "{} Config file already exists at: {}",
            "Error:".red().bold(),
            config_path.display()
        );
        println!("Use {} to overwrite", "--force".yellow());
        return Ok(Exit::ConfigError);
    }

    HarnessConfig::default()
        .save(&config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!(
        "{} Created config file at: {}",
        "Success:".green().bold(),
        config_path.display()
    );
    println!("{}", "Set registry_url before running.".dimmed());
    Ok(Exit::Success)
}

/// Print the effective configuration
fn show(explicit: Option<PathBuf>, format: &str) -> Result<Exit> {
    let config = load_config(explicit)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => println!("{}", config.to_toml_string()?),
        other => bail!("Unknown format '{}', expected toml or json", other),
    }
    Ok(Exit::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_writes_defaults_and_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert_eq!(init(Some(path.clone()), false).unwrap(), Exit::Success);
        assert_eq!(HarnessConfig::load(&path).unwrap(), HarnessConfig::default());

        assert_eq!(init(Some(path.clone()), false).unwrap(), Exit::ConfigError);
        assert_eq!(init(Some(path), true).unwrap(), Exit::Success);
    }
}
