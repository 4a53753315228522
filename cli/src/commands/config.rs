use anyhow::Result;

use burrow_client::config::{config_dir, ClientConfig};

pub fn run() -> Result<()> {
    let cfg = ClientConfig::load()?;

    println!("burrow client configuration");
    println!();
    println!("  Config dir:    {}", config_dir().display());
    println!("  Server URL:    {}", cfg.server_url);
    if cfg.token.is_empty() {
        println!("  Token:         (not set)");
    } else {
        println!("  Token:         {}", mask_token(&cfg.token));
    }
    println!("  Server host:   {}", cfg.server_hostname);
    println!("  Tunnel URL:    {}", cfg.tunnel_url());
    Ok(())
}

fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        return "****".to_string();
    }
    format!("{}****{}", &token[..4], &token[token.len() - 4..])
}
