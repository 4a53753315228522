use anyhow::{bail, Result};
use clap::Subcommand;

use burrow_client::config::ClientConfig;
use burrow_client::manager::Manager;

#[derive(Subcommand)]
pub enum TunnelCommand {
    /// Create a new tunnel
    Create {
        /// Local service address (e.g. localhost:5000)
        #[arg(short, long)]
        local: String,

        /// Subdomain under the server hostname
        #[arg(short, long, conflicts_with = "url")]
        subdomain: Option<String>,

        /// Custom domain
        #[arg(short, long)]
        url: Option<String>,

        /// Private tunnel (reserved)
        #[arg(short, long)]
        private: bool,

        /// Custom tunnel name
        #[arg(long)]
        name: Option<String>,
    },
    /// Start a tunnel in the foreground
    Start { name: String },
    /// Stop a running tunnel
    Stop { name: String },
    /// List tunnels
    List,
    /// Show tunnel details
    Show { name: String },
    /// Delete a tunnel
    Delete {
        name: String,

        /// Delete without confirmation
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn run(command: TunnelCommand) -> Result<()> {
    let manager = Manager::new();
    match command {
        TunnelCommand::Create {
            local,
            subdomain,
            url,
            private,
            name,
        } => {
            if subdomain.is_none() && url.is_none() {
                bail!("either --subdomain or --url is required");
            }
            let cfg = ClientConfig::load()?;
            let def = manager.create(
                &cfg,
                &local,
                subdomain.as_deref(),
                url.as_deref(),
                private,
                name.as_deref(),
            )?;
            println!("Tunnel created: {}", def.name);
            println!("  Hostname: https://{}", def.hostname);
            println!("  Local:    http://{}", def.local);
            println!(
                "  Status:   not running (use 'burrow tunnel start {}' to start)",
                def.name
            );
            Ok(())
        }
        TunnelCommand::Start { name } => {
            let cfg = ClientConfig::load()?;
            if cfg.server_url.is_empty() || cfg.token.is_empty() {
                bail!("client config required: set BURROW_SERVER and BURROW_TOKEN or ~/.burrow/client.json");
            }
            let def = manager.get(&name)?;
            println!("Tunnel '{}' active: https://{}", def.name, def.hostname);
            println!("Press Ctrl+C to stop.");
            tokio::select! {
                result = manager.run_once(&cfg, &name) => result,
                _ = tokio::signal::ctrl_c() => {
                    println!("\nTunnel stopped.");
                    Ok(())
                }
            }
        }
        TunnelCommand::Stop { name } => {
            manager.stop(&name)?;
            println!("Tunnel '{name}' stopped");
            Ok(())
        }
        TunnelCommand::List => {
            let tunnels = manager.list()?;
            if tunnels.is_empty() {
                println!("No tunnels defined.");
                return Ok(());
            }
            for def in tunnels {
                let status = if def.running { "running" } else { "stopped" };
                println!("{}  {}  {}  {}", def.name, def.hostname, def.local, status);
            }
            Ok(())
        }
        TunnelCommand::Show { name } => {
            let def = manager.get(&name)?;
            println!("Name:     {}", def.name);
            println!("Hostname: {}", def.hostname);
            println!("Local:    {}", def.local);
            println!("Private:  {}", def.private);
            println!("Created:  {}", def.created_at);
            println!("Updated:  {}", def.updated_at);
            Ok(())
        }
        TunnelCommand::Delete { name, force: _ } => {
            manager.delete(&name)?;
            println!("Tunnel '{name}' deleted");
            Ok(())
        }
    }
}
