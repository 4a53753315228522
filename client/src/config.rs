//! Client configuration.
//!
//! `~/.burrow/client.json` holds the relay URL and token; the
//! `BURROW_SERVER` and `BURROW_TOKEN` environment variables override
//! it. The server hostname is derived from the URL when not set
//! explicitly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use http::Uri;
use serde::{Deserialize, Serialize};

const CLIENT_CONFIG_FILE: &str = "client.json";
const DEFAULT_TUNNEL_PORT: u16 = 4443;

/// Burrow directory in the user's home (`~/.burrow`).
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".burrow")
}

/// Directory holding tunnel definition files.
pub fn tunnels_dir() -> PathBuf {
    config_dir().join("tunnels")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub token: String,
    /// Derived from `server_url` when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_hostname: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tunnel_port: u16,
}

fn is_zero(port: &u16) -> bool {
    *port == 0
}

impl ClientConfig {
    /// Loads `~/.burrow/client.json` with environment overrides. A
    /// missing file yields an empty config so the env alone suffices.
    pub fn load() -> Result<ClientConfig> {
        let mut cfg = Self::from_file(&config_dir().join(CLIENT_CONFIG_FILE))?;
        if let Ok(server) = std::env::var("BURROW_SERVER") {
            if !server.is_empty() {
                cfg.server_url = server;
                cfg.server_hostname = String::new();
            }
        }
        if let Ok(token) = std::env::var("BURROW_TOKEN") {
            if !token.is_empty() {
                cfg.token = token;
            }
        }
        cfg.fill_derived();
        Ok(cfg)
    }

    /// Reads a config file without applying environment overrides.
    pub fn from_file(path: &Path) -> Result<ClientConfig> {
        let mut cfg = match std::fs::read(path) {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("parse {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => ClientConfig::default(),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", path.display()));
            }
        };
        cfg.fill_derived();
        Ok(cfg)
    }

    /// Writes the config to `~/.burrow/client.json` with 0600.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir();
        std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(CLIENT_CONFIG_FILE);
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn fill_derived(&mut self) {
        if self.server_hostname.is_empty() && !self.server_url.is_empty() {
            if let Ok(uri) = self.server_url.parse::<Uri>() {
                self.server_hostname = uri.host().unwrap_or_default().to_string();
            }
        }
    }

    /// URL the connector dials: the server host on the tunnel port,
    /// with the scheme mapped to `ws`/`wss`.
    pub fn tunnel_url(&self) -> String {
        let port = if self.tunnel_port == 0 {
            DEFAULT_TUNNEL_PORT
        } else {
            self.tunnel_port
        };
        let (scheme, host) = match self.server_url.parse::<Uri>() {
            Ok(uri) => {
                let scheme = match uri.scheme_str() {
                    Some("http") | Some("ws") => "ws",
                    _ => "wss",
                };
                (scheme, uri.host().unwrap_or_default().to_string())
            }
            Err(_) => ("wss", self.server_url.trim_end_matches('/').to_string()),
        };
        format!("{scheme}://{host}:{port}")
    }
}
