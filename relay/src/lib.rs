//! Burrow relay server.
//!
//! Runs two plaintext listeners: a web listener serving the public
//! proxy front-end plus the admin API, and a tunnel listener accepting
//! WebSocket streams from clients. TLS termination is left to an
//! upstream reverse proxy.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub mod admin;
pub mod domains;
pub mod endpoint;
pub mod proxy;
pub mod registry;
pub mod stream;

use domains::DomainStore;
use registry::Registry;

/// Default cap on buffered public request bodies (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Public hostname of the server (e.g. `tunnel.example.com`).
    pub hostname: String,
    /// Port for public traffic and the admin API.
    pub web_port: u16,
    /// Port for tunnel client WebSocket connections.
    pub tunnel_port: u16,
    /// Token tunnel clients must present. Required.
    pub client_token: String,
    /// Token for the admin API. Empty means all admin requests are rejected.
    pub admin_token: String,
    /// Directory holding `allowed_domains.json`.
    pub data_dir: PathBuf,
    /// Upper bound on buffered request bodies.
    pub max_body_bytes: usize,
}

/// State shared by both listeners.
pub struct ServerState {
    pub config: Config,
    pub registry: Registry,
    pub domains: DomainStore,
}

impl ServerState {
    pub fn new(config: Config, domains: DomainStore) -> Self {
        Self {
            config,
            registry: Registry::new(),
            domains,
        }
    }
}

/// A relay server bound to its listeners but not yet serving.
pub struct Server {
    state: Arc<ServerState>,
    web_listener: TcpListener,
    tunnel_listener: TcpListener,
}

impl Server {
    /// Validates the configuration, loads the domain store, and binds
    /// both listeners. Ports may be 0 to pick ephemeral ones.
    pub async fn bind(config: Config) -> Result<Server> {
        if config.hostname.is_empty() {
            bail!("hostname is required");
        }
        if config.client_token.is_empty() {
            bail!("client-token is required");
        }

        let domains = DomainStore::open(&config.data_dir)
            .await
            .context("load allowed domains")?;

        let web_listener = TcpListener::bind(("0.0.0.0", config.web_port))
            .await
            .with_context(|| format!("bind web port {}", config.web_port))?;
        let tunnel_listener = TcpListener::bind(("0.0.0.0", config.tunnel_port))
            .await
            .with_context(|| format!("bind tunnel port {}", config.tunnel_port))?;

        Ok(Server {
            state: Arc::new(ServerState::new(config, domains)),
            web_listener,
            tunnel_listener,
        })
    }

    pub fn web_addr(&self) -> Result<SocketAddr> {
        Ok(self.web_listener.local_addr()?)
    }

    pub fn tunnel_addr(&self) -> Result<SocketAddr> {
        Ok(self.tunnel_listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    /// Serves both listeners until one of them fails.
    pub async fn run(self) -> Result<()> {
        let web = web_router(self.state.clone());
        let tunnel = stream::router(self.state.clone());

        info!(
            "relay listening web=:{} tunnel=:{} hostname={}",
            self.web_listener.local_addr()?.port(),
            self.tunnel_listener.local_addr()?.port(),
            self.state.config.hostname,
        );

        tokio::try_join!(
            axum::serve(self.web_listener, web.into_make_service()).into_future(),
            axum::serve(
                self.tunnel_listener,
                tunnel.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .into_future(),
        )?;
        Ok(())
    }
}

/// Web listener router: admin API first, everything else falls through
/// to the public proxy. Admin paths shadow same-named paths of proxied
/// apps regardless of Host, matching the reference behavior.
pub fn web_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/admin/info", get(admin::info))
        .route("/admin/tunnels", get(admin::tunnels))
        .route(
            "/admin/domains",
            get(admin::list_domains).post(admin::add_domain),
        )
        .route(
            "/admin/domains/{domain}",
            axum::routing::delete(admin::remove_domain),
        )
        .route("/admin/{*rest}", axum::routing::any(admin::not_found))
        .fallback(proxy::handle)
        .with_state(state)
}
