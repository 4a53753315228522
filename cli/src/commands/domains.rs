use anyhow::{bail, Result};
use clap::Subcommand;
use serde::Deserialize;
use serde_json::json;

use super::AdminClient;

#[derive(Subcommand)]
pub enum DomainsCommand {
    /// Add a domain to the allow-list and print DNS instructions
    Add {
        domain: String,

        /// Relay server URL, or BURROW_SERVER
        #[arg(long)]
        server: Option<String>,

        /// Admin token, or BURROW_ADMIN_TOKEN
        #[arg(long)]
        admin_token: Option<String>,
    },
}

#[derive(Deserialize)]
struct ServerInfo {
    #[serde(default)]
    hostname: String,
}

pub async fn run(command: DomainsCommand) -> Result<()> {
    match command {
        DomainsCommand::Add {
            domain,
            server,
            admin_token,
        } => {
            let domain = domain.trim().to_ascii_lowercase();
            if domain.is_empty() {
                bail!("domain is required");
            }
            let admin = AdminClient::new(server, admin_token)?;
            admin
                .post_json("/admin/domains", &json!({ "domain": domain }))
                .await?;
            let info: ServerInfo = admin.get_json("/admin/info").await?;

            println!("Added domain: {domain}\n");
            println!("DNS setup:");
            println!("  If this is the first time setting up the server, create an A record:");
            println!("    A  {}  <server-ip>", info.hostname);
            println!("  Then for your custom domain, create a wildcard CNAME:");
            println!("    CNAME  *.{domain}  {}", info.hostname);
            println!();
            println!("  Replace <server-ip> with your server's public IP.");
            Ok(())
        }
    }
}
