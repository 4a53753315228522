use anyhow::{bail, Context, Result};

use burrow_client::config::ClientConfig;

pub async fn run() -> Result<()> {
    let cfg = ClientConfig::load()?;
    if cfg.server_url.is_empty() || cfg.token.is_empty() {
        bail!("BURROW_SERVER and BURROW_TOKEN (or ~/.burrow/client.json) must be set");
    }

    reqwest::Client::new()
        .head(&cfg.server_url)
        .send()
        .await
        .context("cannot reach server")?;

    println!("Client config OK and server reachable");
    Ok(())
}
