use colored::Colorize;

use crate::cli::{Cli, ConfigCommands};
use mediascope::config::Config;
use mediascope::error::{MediascopeError, Result};

pub async fn run(cli: &Cli, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show(cli).await,
        ConfigCommands::Set { key, value } => set(cli, key, value).await,
        ConfigCommands::Path => path(cli).await,
    }
}

async fn show(cli: &Cli) -> Result<()> {
    let config = Config::load()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| MediascopeError::ConfigError(e.to_string()))?;
        println!("{}", toml_str);
    }

    Ok(())
}

async fn set(cli: &Cli, key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;

    match key {
        "observer.flush_delay_ms" => config.observer.flush_delay_ms = parse_millis(key, value)?,
        "relay.flush_delay_ms" => config.relay.flush_delay_ms = parse_millis(key, value)?,
        "extension.id" => config.extension.id = value.to_string(),
        "extension.version" => config.extension.version = value.to_string(),
        "extension.browser" => config.extension.browser = value.to_string(),
        "host.session_id" => config.host.session_id = Some(value.to_string()),
        _ => {
            return Err(MediascopeError::ConfigError(format!(
                "Unknown config key: {}",
                key
            )))
        }
    }

    config.save()?;
    if cli.json {
        println!("{}", serde_json::json!({ "key": key, "value": value }));
    } else {
        println!("{} Set {} = {}", "✓".green(), key, value);
    }

    Ok(())
}

fn parse_millis(key: &str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| {
        MediascopeError::ConfigError(format!("{} must be a number of milliseconds", key))
    })
}

async fn path(cli: &Cli) -> Result<()> {
    let path = Config::config_path();

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "path": path.display().to_string()
            })
        );
    } else {
        println!("{}", path.display());
    }

    Ok(())
}
