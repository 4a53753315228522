use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use burrow_relay::{Config, Server, DEFAULT_MAX_BODY_BYTES};

use super::env_var;

#[derive(Args)]
pub struct ServeArgs {
    /// Server public hostname (e.g. tunnel.example.com), or BURROW_HOSTNAME
    #[arg(long)]
    hostname: Option<String>,

    /// Port for public traffic and the admin API
    #[arg(long, default_value_t = 8080)]
    web_port: u16,

    /// Port for tunnel client connections
    #[arg(long, default_value_t = 4443)]
    tunnel_port: u16,

    /// Token for tunnel clients, or BURROW_CLIENT_TOKEN
    #[arg(long)]
    client_token: Option<String>,

    /// Token for the admin API, or BURROW_ADMIN_TOKEN
    #[arg(long)]
    admin_token: Option<String>,

    /// Directory for allowed_domains.json
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let hostname = args
        .hostname
        .or_else(|| env_var("BURROW_HOSTNAME"))
        .context("hostname is required (--hostname or BURROW_HOSTNAME)")?;
    let client_token = args
        .client_token
        .or_else(|| env_var("BURROW_CLIENT_TOKEN"))
        .context("client-token is required (--client-token or BURROW_CLIENT_TOKEN)")?;
    let admin_token = args
        .admin_token
        .or_else(|| env_var("BURROW_ADMIN_TOKEN"))
        .unwrap_or_default();
    let data_dir = args.data_dir.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".burrow-server")
    });

    let config = Config {
        hostname,
        web_port: args.web_port,
        tunnel_port: args.tunnel_port,
        client_token,
        admin_token,
        data_dir,
        max_body_bytes: DEFAULT_MAX_BODY_BYTES,
    };

    let server = Server::bind(config).await?;
    server.run().await
}
