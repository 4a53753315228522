//! End-to-end tests: a real relay, real WebSocket tunnel clients, and
//! real local HTTP services, all on ephemeral loopback ports.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::Query;
use axum::routing::get;
use axum::Router;
use tokio::task::{JoinHandle, JoinSet};

use burrow_client::connector::{run_tunnel, ConnectOptions};
use burrow_relay::{Config, Server, DEFAULT_MAX_BODY_BYTES};

const CLIENT_TOKEN: &str = "e2e-client-token";
const ADMIN_TOKEN: &str = "e2e-admin-token";
const SERVER_HOSTNAME: &str = "tunnel.example.com";

struct Relay {
    web_addr: SocketAddr,
    tunnel_addr: SocketAddr,
    _data_dir: tempfile::TempDir,
}

async fn start_relay() -> Relay {
    let data_dir = tempfile::tempdir().unwrap();
    let server = Server::bind(Config {
        hostname: SERVER_HOSTNAME.into(),
        web_port: 0,
        tunnel_port: 0,
        client_token: CLIENT_TOKEN.into(),
        admin_token: ADMIN_TOKEN.into(),
        data_dir: data_dir.path().to_path_buf(),
        max_body_bytes: DEFAULT_MAX_BODY_BYTES,
    })
    .await
    .unwrap();
    let web_addr = server.web_addr().unwrap();
    let tunnel_addr = server.tunnel_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    Relay {
        web_addr,
        tunnel_addr,
        _data_dir: data_dir,
    }
}

/// A local app answering `/foo`, `/whoami`, and `/echo?nonce=..`.
async fn start_local_app(whoami: &'static str) -> SocketAddr {
    let app = Router::new()
        .route("/foo", get(|| async { "hello from local" }))
        .route("/whoami", get(move || async move { whoami }))
        .route(
            "/echo",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                params.get("nonce").cloned().unwrap_or_default()
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn connect_options(relay: &Relay, hostname: &str, local: SocketAddr) -> ConnectOptions {
    ConnectOptions {
        tunnel_url: format!("ws://127.0.0.1:{}", relay.tunnel_addr.port()),
        token: CLIENT_TOKEN.into(),
        hostname: hostname.into(),
        local_url: format!("http://{local}"),
    }
}

fn spawn_client(relay: &Relay, hostname: &str, local: SocketAddr) -> JoinHandle<()> {
    let opts = connect_options(relay, hostname, local);
    tokio::spawn(async move {
        let _ = run_tunnel(opts).await;
    })
}

/// Public-side HTTP client that resolves any hostname to the relay's
/// web listener.
fn public_client(relay: &Relay, hostname: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .resolve(
            hostname,
            SocketAddr::from(([127, 0, 0, 1], relay.web_addr.port())),
        )
        .build()
        .unwrap()
}

fn public_url(relay: &Relay, hostname: &str, path_and_query: &str) -> String {
    format!(
        "http://{hostname}:{}{path_and_query}",
        relay.web_addr.port()
    )
}

async fn wait_for_status(
    client: &reqwest::Client,
    url: &str,
    status: u16,
) -> reqwest::Response {
    for _ in 0..200 {
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().as_u16() == status {
                return resp;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("never saw {status} from {url}");
}

fn admin_client() -> reqwest::Client {
    reqwest::Client::new()
}

fn admin_url(relay: &Relay, path: &str) -> String {
    format!("http://127.0.0.1:{}{path}", relay.web_addr.port())
}

#[tokio::test]
async fn subdomain_tunnel_happy_path() {
    let relay = start_relay().await;
    let local = start_local_app("a").await;
    let hostname = "app.tunnel.example.com";
    let _client_task = spawn_client(&relay, hostname, local);

    let client = public_client(&relay, hostname);
    let url = public_url(&relay, hostname, "/foo?bar=baz");
    let resp = wait_for_status(&client, &url, 200).await;
    assert_eq!(resp.text().await.unwrap(), "hello from local");
}

#[tokio::test]
async fn server_hostname_serves_info_page() {
    let relay = start_relay().await;
    let client = public_client(&relay, SERVER_HOSTNAME);
    let url = public_url(&relay, SERVER_HOSTNAME, "/");
    let resp = wait_for_status(&client, &url, 200).await;
    let text = resp.text().await.unwrap();
    assert!(text.contains(SERVER_HOSTNAME));
}

#[tokio::test]
async fn custom_domain_policy() {
    let relay = start_relay().await;
    let local = start_local_app("a").await;

    let admin = admin_client();
    let resp = admin
        .post(admin_url(&relay, "/admin/domains"))
        .bearer_auth(ADMIN_TOKEN)
        .json(&serde_json::json!({ "domain": "my.domain" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Allowed custom domain registers and serves.
    let hostname = "app.my.domain";
    let _client_task = spawn_client(&relay, hostname, local);
    let client = public_client(&relay, hostname);
    wait_for_status(&client, &public_url(&relay, hostname, "/foo"), 200).await;

    // A domain outside the policy is nacked, not retried.
    let err = run_tunnel(connect_options(&relay, "app.other.domain", local))
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("domain not allowed"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn wrong_client_token_is_rejected() {
    let relay = start_relay().await;
    let local = start_local_app("a").await;

    let mut opts = connect_options(&relay, "app.tunnel.example.com", local);
    opts.token = "wrong-token".into();
    let err = run_tunnel(opts).await.unwrap_err();
    assert!(
        err.to_string().contains("unauthorized"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn eviction_hands_hostname_to_newest_client() {
    let relay = start_relay().await;
    let local_a = start_local_app("a").await;
    let local_b = start_local_app("b").await;
    let hostname = "app.tunnel.example.com";

    let first = spawn_client(&relay, hostname, local_a);
    let client = public_client(&relay, hostname);
    let url = public_url(&relay, hostname, "/whoami");
    let resp = wait_for_status(&client, &url, 200).await;
    assert_eq!(resp.text().await.unwrap(), "a");

    let _second = spawn_client(&relay, hostname, local_b);
    for _ in 0..200 {
        let resp = wait_for_status(&client, &url, 200).await;
        if resp.text().await.unwrap() == "b" {
            // The evicted client's stream ends cleanly.
            for _ in 0..200 {
                if first.is_finished() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            panic!("evicted client never finished");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("traffic never reached the second client");
}

#[tokio::test]
async fn disconnect_turns_into_404() {
    let relay = start_relay().await;
    let local = start_local_app("a").await;
    let hostname = "app.tunnel.example.com";

    let client_task = spawn_client(&relay, hostname, local);
    let client = public_client(&relay, hostname);
    let url = public_url(&relay, hostname, "/foo");
    wait_for_status(&client, &url, 200).await;

    client_task.abort();
    let resp = wait_for_status(&client, &url, 404).await;
    assert_eq!(resp.text().await.unwrap(), "no tunnel for this hostname");
}

#[tokio::test]
async fn admin_domains_lifecycle() {
    let relay = start_relay().await;
    let admin = admin_client();
    let url = admin_url(&relay, "/admin/domains");

    let list: Vec<String> = admin
        .get(&url)
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list.is_empty());

    let resp = admin
        .post(&url)
        .bearer_auth(ADMIN_TOKEN)
        .json(&serde_json::json!({ "domain": "custom.example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let list: Vec<String> = admin
        .get(&url)
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list, vec!["custom.example.com"]);

    let resp = admin
        .delete(admin_url(&relay, "/admin/domains/custom.example.com"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let list: Vec<String> = admin
        .get(&url)
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list.is_empty());
}

#[tokio::test]
async fn admin_requires_token() {
    let relay = start_relay().await;
    let admin = admin_client();
    let resp = admin
        .get(admin_url(&relay, "/admin/tunnels"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn correlation_stress_keeps_responses_apart() {
    let relay = start_relay().await;
    let local = start_local_app("a").await;
    let hostname = "app.tunnel.example.com";
    let _client_task = spawn_client(&relay, hostname, local);

    let client = public_client(&relay, hostname);
    wait_for_status(&client, &public_url(&relay, hostname, "/foo"), 200).await;

    let mut tasks = JoinSet::new();
    for i in 0..100 {
        let client = client.clone();
        let url = public_url(&relay, hostname, &format!("/echo?nonce=n{i}"));
        tasks.spawn(async move {
            let resp = client.get(url).send().await.unwrap();
            assert_eq!(resp.status().as_u16(), 200);
            (i, resp.text().await.unwrap())
        });
    }
    while let Some(result) = tasks.join_next().await {
        let (i, body) = result.unwrap();
        assert_eq!(body, format!("n{i}"), "response crossed requests");
    }
}
