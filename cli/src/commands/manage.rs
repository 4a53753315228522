use std::collections::HashMap;

use anyhow::Result;
use clap::Subcommand;

use super::AdminClient;

#[derive(Subcommand)]
pub enum ManageCommand {
    /// List active tunnels
    Tunnels {
        /// Relay server URL, or BURROW_SERVER
        #[arg(long)]
        server: Option<String>,

        /// Admin token, or BURROW_ADMIN_TOKEN
        #[arg(long)]
        admin_token: Option<String>,
    },
    /// Manage allowed domains
    #[command(subcommand)]
    Domains(ManageDomains),
}

#[derive(Subcommand)]
pub enum ManageDomains {
    /// List allowed domains
    List {
        /// Relay server URL, or BURROW_SERVER
        #[arg(long)]
        server: Option<String>,

        /// Admin token, or BURROW_ADMIN_TOKEN
        #[arg(long)]
        admin_token: Option<String>,
    },
}

pub async fn run(command: ManageCommand) -> Result<()> {
    match command {
        ManageCommand::Tunnels {
            server,
            admin_token,
        } => {
            let admin = AdminClient::new(server, admin_token)?;
            let tunnels: HashMap<String, String> = admin.get_json("/admin/tunnels").await?;
            if tunnels.is_empty() {
                println!("No active tunnels.");
                return Ok(());
            }
            println!("Active tunnels:");
            let mut entries: Vec<_> = tunnels.into_iter().collect();
            entries.sort();
            for (hostname, peer) in entries {
                println!("  {hostname} -> {peer}");
            }
            Ok(())
        }
        ManageCommand::Domains(ManageDomains::List {
            server,
            admin_token,
        }) => {
            let admin = AdminClient::new(server, admin_token)?;
            let domains: Vec<String> = admin.get_json("/admin/domains").await?;
            if domains.is_empty() {
                println!("No allowed domains.");
                return Ok(());
            }
            println!("Allowed domains:");
            for domain in domains {
                println!("  {domain}");
            }
            Ok(())
        }
    }
}
