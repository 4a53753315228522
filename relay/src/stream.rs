//! Tunnel stream server.
//!
//! Each client holds one WebSocket at `GET /connect`. The first frame
//! must be `register`; after authentication and domain authorization
//! the stream is installed in the registry and split into a writer
//! task draining the endpoint's outbound queue and a reader loop
//! resolving pending responses.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use http::header::{HeaderMap, AUTHORIZATION};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use burrow_shared::auth::{bearer_token, token_matches};
use burrow_shared::protocol::{headers_from_wire, ClientMessage, ServerMessage};

use crate::endpoint::{ProxyResponse, TunnelEndpoint, WsEndpoint, OUTBOUND_CAPACITY};
use crate::registry::normalize_hostname;
use crate::ServerState;

/// Router for the tunnel listener.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/connect", get(connect))
        .with_state(state)
}

async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .unwrap_or_default()
        .to_string();
    ws.on_upgrade(move |socket| handle_stream(socket, state, peer, token))
}

async fn handle_stream(
    mut socket: WebSocket,
    state: Arc<ServerState>,
    peer: SocketAddr,
    token: String,
) {
    let first = match socket.recv().await {
        Some(Ok(msg)) => msg,
        _ => return,
    };

    let (hostname, local_url) = match decode(&first) {
        Some(ClientMessage::Register {
            hostname,
            local_url,
        }) => (normalize_hostname(&hostname), local_url.trim().to_string()),
        _ => {
            let _ = send_nack(&mut socket, "first message must be Register").await;
            return;
        }
    };

    if hostname.is_empty() || local_url.is_empty() {
        let _ = send_nack(&mut socket, "hostname and local_url required").await;
        return;
    }

    if !state.config.client_token.is_empty() && !token_matches(&token, &state.config.client_token)
    {
        warn!("tunnel auth failed for {} from {}", hostname, peer);
        let _ = send_nack(&mut socket, "unauthorized").await;
        return;
    }

    let allowed = state.domains.list().await;
    if !hostname_allowed(&hostname, &state.config.hostname, &allowed) {
        let _ = send_nack(&mut socket, "domain not allowed").await;
        return;
    }

    let (tx, mut rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let endpoint = Arc::new(WsEndpoint::new(hostname.clone(), peer.to_string(), tx));
    let handle: Arc<dyn TunnelEndpoint> = endpoint.clone();
    state.registry.register(&hostname, handle.clone());

    if send(
        &mut socket,
        &ServerMessage::RegisterAck {
            ok: true,
            error: String::new(),
        },
    )
    .await
    .is_err()
    {
        endpoint.close();
        state.registry.unregister_endpoint(&hostname, &handle);
        return;
    }

    info!("tunnel registered {} -> {} from {}", hostname, local_url, peer);

    let (mut sink, mut reader) = socket.split();

    // Writer: drain the outbound queue onto the socket. The queue ends
    // when the endpoint closes (eviction included); a Close frame then
    // tells the client to go away.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match serde_json::to_vec(&msg) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!("encode outbound frame: {}", err);
                    continue;
                }
            };
            if sink.send(Message::Binary(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    while let Some(Ok(msg)) = reader.next().await {
        match decode(&msg) {
            Some(ClientMessage::ProxyResponse {
                id,
                status,
                headers,
                body,
            }) => {
                endpoint.deliver(ProxyResponse {
                    id,
                    status,
                    headers: headers_from_wire(&headers),
                    body: body.into(),
                });
            }
            Some(ClientMessage::Register { .. }) => {
                debug!("ignoring repeated register on {}", hostname);
            }
            None => {}
        }
    }

    endpoint.close();
    state.registry.unregister_endpoint(&hostname, &handle);
    writer.abort();
    info!("tunnel closed {}", hostname);
}

/// A hostname is accepted when it is the server's own name, a
/// subdomain of it, or covered by an allow-listed apex domain.
fn hostname_allowed(hostname: &str, server_hostname: &str, allowed: &[String]) -> bool {
    if hostname == server_hostname || hostname.ends_with(&format!(".{server_hostname}")) {
        return true;
    }
    allowed.iter().any(|domain| {
        let domain = domain.trim().to_ascii_lowercase();
        !domain.is_empty() && (hostname == domain || hostname.ends_with(&format!(".{domain}")))
    })
}

fn decode(msg: &Message) -> Option<ClientMessage> {
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).ok(),
        Message::Binary(data) => serde_json::from_slice(data).ok(),
        _ => None,
    }
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    let frame = serde_json::to_vec(msg).map_err(axum::Error::new)?;
    socket.send(Message::Binary(frame.into())).await
}

async fn send_nack(socket: &mut WebSocket, error: &str) -> Result<(), axum::Error> {
    send(
        socket,
        &ServerMessage::RegisterAck {
            ok: false,
            error: error.to_string(),
        },
    )
    .await
}
