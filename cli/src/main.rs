use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{config, domains, health, manage, serve, tunnel};

#[derive(Parser)]
#[command(name = "burrow")]
#[command(version)]
#[command(about = "Self-hosted tunneling CLI and server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the burrow relay server
    Serve(serve::ServeArgs),
    /// Manage tunnels
    #[command(subcommand)]
    Tunnel(tunnel::TunnelCommand),
    /// Show client configuration
    Config,
    /// Check client config and server connectivity
    Health,
    /// Manage allowed domains on the relay
    #[command(subcommand)]
    Domains(domains::DomainsCommand),
    /// Remote management of the relay
    #[command(subcommand)]
    Manage(manage::ManageCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => serve::run(args).await,
        Commands::Tunnel(command) => tunnel::run(command).await,
        Commands::Config => config::run(),
        Commands::Health => health::run().await,
        Commands::Domains(command) => domains::run(command).await,
        Commands::Manage(command) => manage::run(command).await,
    }
}
