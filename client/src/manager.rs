//! Tunnel definition manager.
//!
//! Definitions (name, hostname, local address) live only on the client
//! in `~/.burrow/tunnels/<name>.json`; the relay holds nothing but the
//! live stream. Started tunnels are supervised in-process and
//! reconnect on transport failure; a registration nack is final.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info};

use burrow_shared::Error;

use crate::config::{self, ClientConfig};
use crate::connector::{self, ConnectOptions};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One persisted tunnel definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelDef {
    pub name: String,
    pub hostname: String,
    /// Local service address, e.g. `localhost:8080`.
    pub local: String,
    #[serde(default)]
    pub private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether this manager is currently running the tunnel.
    #[serde(skip)]
    pub running: bool,
}

pub struct Manager {
    tunnels_dir: PathBuf,
    running: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::with_dir(config::tunnels_dir())
    }

    pub fn with_dir(tunnels_dir: PathBuf) -> Self {
        Self {
            tunnels_dir,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Creates and persists a definition. The hostname is either the
    /// custom URL or `<subdomain>.<server hostname>`.
    pub fn create(
        &self,
        cfg: &ClientConfig,
        local: &str,
        subdomain: Option<&str>,
        custom_url: Option<&str>,
        private: bool,
        name: Option<&str>,
    ) -> Result<TunnelDef> {
        if cfg.server_url.is_empty() || cfg.token.is_empty() {
            bail!("client config required: set BURROW_SERVER and BURROW_TOKEN or ~/.burrow/client.json");
        }

        let hostname = match (subdomain, custom_url) {
            (Some(subdomain), _) if !subdomain.is_empty() => {
                if cfg.server_hostname.is_empty() {
                    bail!("server hostname required for a subdomain (set BURROW_SERVER or server_hostname in client.json)");
                }
                format!("{subdomain}.{}", cfg.server_hostname)
            }
            (_, Some(url)) if !url.is_empty() => url.to_string(),
            _ => bail!("either a subdomain or a custom URL is required"),
        };
        let hostname = hostname.trim().to_ascii_lowercase();

        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match subdomain {
                Some(subdomain) if !subdomain.is_empty() => format!("{subdomain}-tunnel"),
                _ => format!("{}-tunnel", hostname.replace('.', "-")),
            },
        };

        std::fs::create_dir_all(&self.tunnels_dir)
            .with_context(|| format!("create {}", self.tunnels_dir.display()))?;

        let now = Utc::now();
        let def = TunnelDef {
            name,
            hostname,
            local: local.to_string(),
            private,
            created_at: now,
            updated_at: now,
            running: false,
        };
        self.save(&def)?;
        Ok(def)
    }

    pub fn get(&self, name: &str) -> Result<TunnelDef> {
        let path = self.def_path(name);
        let data =
            std::fs::read(&path).with_context(|| format!("tunnel '{name}' not found"))?;
        let mut def: TunnelDef =
            serde_json::from_slice(&data).with_context(|| format!("parse {}", path.display()))?;
        def.running = self.is_running(&def.name);
        Ok(def)
    }

    pub fn list(&self) -> Result<Vec<TunnelDef>> {
        std::fs::create_dir_all(&self.tunnels_dir)
            .with_context(|| format!("create {}", self.tunnels_dir.display()))?;
        let mut tunnels = Vec::new();
        for entry in std::fs::read_dir(&self.tunnels_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match self.get(name) {
                Ok(def) if !def.hostname.is_empty() => tunnels.push(def),
                _ => continue,
            }
        }
        tunnels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tunnels)
    }

    /// Runs the tunnel in the current task, without supervision. Used
    /// for foreground starts.
    pub async fn run_once(&self, cfg: &ClientConfig, name: &str) -> Result<()> {
        let def = self.get(name)?;
        connector::run_tunnel(Self::options(cfg, &def)).await?;
        Ok(())
    }

    /// Starts a supervised background task for the tunnel. Transport
    /// errors reconnect after a short delay; a registration nack ends
    /// the task.
    pub fn start(&self, cfg: &ClientConfig, name: &str) -> Result<()> {
        let def = self.get(name)?;
        if cfg.server_url.is_empty() || cfg.token.is_empty() {
            bail!("client config required: set BURROW_SERVER and BURROW_TOKEN or ~/.burrow/client.json");
        }

        let mut running = self.running.lock().expect("running lock");
        if running.contains_key(name) {
            bail!("tunnel {name} is already running");
        }

        let opts = Self::options(cfg, &def);
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            loop {
                match connector::run_tunnel(opts.clone()).await {
                    Ok(()) => {
                        info!("tunnel '{}' closed", task_name);
                        break;
                    }
                    Err(Error::Registration(reason)) => {
                        error!("tunnel '{}' rejected: {}", task_name, reason);
                        break;
                    }
                    Err(err) => {
                        error!(
                            "tunnel '{}' error: {}; reconnecting in {}s",
                            task_name,
                            err,
                            RECONNECT_DELAY.as_secs()
                        );
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });
        running.insert(name.to_string(), handle);
        Ok(())
    }

    pub fn stop(&self, name: &str) -> Result<()> {
        let handle = self.running.lock().expect("running lock").remove(name);
        match handle {
            Some(handle) => {
                handle.abort();
                Ok(())
            }
            None => bail!("tunnel {name} is not running"),
        }
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let def = self.get(name)?;
        let _ = self.stop(name);
        std::fs::remove_file(self.def_path(&def.name))
            .with_context(|| format!("delete tunnel '{name}'"))?;
        Ok(())
    }

    fn options(cfg: &ClientConfig, def: &TunnelDef) -> ConnectOptions {
        ConnectOptions {
            tunnel_url: cfg.tunnel_url(),
            token: cfg.token.clone(),
            hostname: def.hostname.clone(),
            local_url: format!("http://{}", def.local),
        }
    }

    fn is_running(&self, name: &str) -> bool {
        self.running.lock().expect("running lock").contains_key(name)
    }

    fn def_path(&self, name: &str) -> PathBuf {
        self.tunnels_dir.join(format!("{name}.json"))
    }

    fn save(&self, def: &TunnelDef) -> Result<()> {
        let path = self.def_path(&def.name);
        let data = serde_json::to_vec_pretty(def)?;
        std::fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
