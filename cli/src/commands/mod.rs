pub mod config;
pub mod domains;
pub mod health;
pub mod manage;
pub mod serve;
pub mod tunnel;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Non-empty environment variable lookup.
pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Small client for the relay's admin API.
pub(crate) struct AdminClient {
    base: String,
    token: String,
    http: reqwest::Client,
}

impl AdminClient {
    pub fn new(server: Option<String>, admin_token: Option<String>) -> Result<Self> {
        let base = server
            .or_else(|| env_var("BURROW_SERVER"))
            .context("server is required (--server or BURROW_SERVER)")?;
        let token = admin_token
            .or_else(|| env_var("BURROW_ADMIN_TOKEN"))
            .context("admin-token is required (--admin-token or BURROW_ADMIN_TOKEN)")?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            token,
            http: reqwest::Client::new(),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(format!("{}{path}", self.base))
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("GET {path}: {}", resp.status());
        }
        resp.json().await.with_context(|| format!("decode {path}"))
    }

    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("POST {path}: {}", resp.status());
        }
        Ok(())
    }
}
