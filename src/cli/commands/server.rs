use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::config::{load_server_config, save_server_config, SavedServer, ServerStatus};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Register remote server")]
    Add {
        #[arg(help = "Server name")]
        name: String,
        #[arg(help = "Server URL")]
        url: String,
        #[arg(long, default_value = "api", help = "Path prefix of the record endpoints")]
        prefix: String,
        #[arg(long, default_value = "", help = "Free-form description")]
        description: String,
    },

    #[command(about = "List saved servers")]
    List,

    #[command(about = "Switch to server (persistent selection)")]
    Use {
        #[arg(help = "Server name to switch to")]
        name: String,
    },

    #[command(about = "Remove server from registry")]
    Delete {
        #[arg(help = "Server name to delete")]
        name: String,
    },

    #[command(about = "Health check server (defaults to current server)")]
    Ping {
        #[arg(help = "Server name to ping")]
        name: Option<String>,
    },

    #[command(about = "Show server name and version")]
    Info {
        #[arg(help = "Server name")]
        name: Option<String>,
    },
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Add { name, url, prefix, description } => {
            let mut config = load_server_config()?;
            let prefix = prefix.trim_matches('/').to_string();
            config.servers.insert(name.clone(), SavedServer::new(url, prefix, description));
            if config.current_server.is_none() {
                config.current_server = Some(name.clone());
            }
            save_server_config(&config)?;
            output_success(output_format, &format!("Added server '{}'", name), None)
        }
        ServerCommands::List => {
            let config = load_server_config()?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Text if config.servers.is_empty() => println!("No servers saved"),
                OutputFormat::Text => {
                    for (name, server) in &config.servers {
                        let marker = if config.current_server.as_deref() == Some(name.as_str()) { "*" } else { " " };
                        println!("{} {:<16} {:<32} {:?}", marker, name, server.url, server.status);
                    }
                }
            }
            Ok(())
        }
        ServerCommands::Use { name } => {
            let mut config = load_server_config()?;
            if !config.servers.contains_key(&name) {
                anyhow::bail!("unknown server '{}'", name);
            }
            config.current_server = Some(name.clone());
            save_server_config(&config)?;
            output_success(output_format, &format!("Switched to server '{}'", name), None)
        }
        ServerCommands::Delete { name } => {
            let mut config = load_server_config()?;
            if config.servers.remove(&name).is_none() {
                anyhow::bail!("unknown server '{}'", name);
            }
            if config.current_server.as_deref() == Some(name.as_str()) {
                config.current_server = None;
            }
            save_server_config(&config)?;
            output_success(output_format, &format!("Removed server '{}'", name), None)
        }
        ServerCommands::Ping { name } => {
            let mut config = load_server_config()?;
            let Some((resolved, saved)) = config.resolve(name.as_deref())? else {
                anyhow::bail!("no server selected; pass a name or run `alpaca server use`");
            };
            let resolved = resolved.to_string();
            let client = ApiClient::new(saved.url.clone(), saved.prefix.clone());

            let status = match client.health().await {
                Ok((code, _)) if code.is_success() => ServerStatus::Up,
                Ok((code, body)) => {
                    tracing::warn!("{} answered {}: {}", client.base_url(), code, body);
                    ServerStatus::Down
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    ServerStatus::Down
                }
            };

            if let Some(server) = config.servers.get_mut(&resolved) {
                server.update_ping(status);
            }
            save_server_config(&config)?;

            output_success(
                output_format,
                &format!("Server '{}' is {:?}", resolved, status),
                Some(json!({ "server": resolved, "status": status })),
            )
        }
        ServerCommands::Info { name } => {
            let client = ApiClient::from_saved(name.as_deref())?;
            let info = client.version().await?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
                OutputFormat::Text => {
                    let name = info.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
                    let version = info.get("version").and_then(|v| v.as_str()).unwrap_or("unknown");
                    println!("{} {} at {}", name, version, client.base_url());
                }
            }
            Ok(())
        }
    }
}
