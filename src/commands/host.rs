use colored::Colorize;

use crate::cli::{Cli, HostCommands};
use mediascope::config::Config;
use mediascope::error::Result;
use mediascope::relay::native_messaging;

pub async fn run(cli: &Cli, command: &HostCommands) -> Result<()> {
    match command {
        HostCommands::Serve { host_id, rotate } => serve(host_id.as_deref(), *rotate).await,
        HostCommands::Install { name, extension_id } => {
            install(cli, name, extension_id.as_deref()).await
        }
        HostCommands::Uninstall { name } => uninstall(cli, name).await,
        HostCommands::Path { name } => path(cli, name).await,
    }
}

/// Reply to one batch. Stdout carries the framed reply and nothing else.
pub async fn serve(host_id: Option<&str>, rotate: bool) -> Result<()> {
    let config = Config::load()?;
    let session = match host_id.map(str::to_string).or(config.host.session_id) {
        Some(session) => session,
        None => native_messaging::load_or_create_session(rotate).await?,
    };
    native_messaging::serve(&session).await
}

async fn install(cli: &Cli, name: &str, extension_id: Option<&str>) -> Result<()> {
    let config = Config::load()?;
    let extension_id = extension_id.unwrap_or(&config.extension.id);
    let manifest_path = native_messaging::install_manifest(name, extension_id)?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "status": "installed",
                "name": name,
                "path": manifest_path.display().to_string(),
                "allowed_origin": native_messaging::extension_origin(extension_id),
            })
        );
    } else {
        println!("  {} Installed native messaging host {}", "✓".green(), name.bold());
        println!("  {}", manifest_path.display().to_string().dimmed());
    }

    Ok(())
}

async fn uninstall(cli: &Cli, name: &str) -> Result<()> {
    let manifest_path = native_messaging::native_host_manifest_path(name)?;
    let existed = manifest_path.exists();
    native_messaging::uninstall_manifest(name)?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "status": if existed { "removed" } else { "not_installed" },
                "name": name,
            })
        );
    } else if existed {
        println!("  {} Removed {}", "✓".green(), manifest_path.display());
    } else {
        println!("  {} {} is not installed", "ℹ".dimmed(), name);
    }

    Ok(())
}

async fn path(cli: &Cli, name: &str) -> Result<()> {
    let manifest_path = native_messaging::native_host_manifest_path(name)?;
    let command = native_messaging::manifest_command(name).ok();

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "manifest": manifest_path.display().to_string(),
                "command": command.as_ref().map(|c| c.display().to_string()),
            })
        );
    } else {
        println!("{}", manifest_path.display());
        match command {
            Some(command) => println!("  {} {}", "→".dimmed(), command.display()),
            None => println!("  {}", "(not installed)".dimmed()),
        }
    }

    Ok(())
}
