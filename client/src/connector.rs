//! Tunnel connector.
//!
//! Holds the client's long-lived WebSocket to the relay: registers the
//! hostname as the first frame, then serves pushed requests until the
//! stream ends. Registration rejections surface as typed errors so
//! callers never retry them.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::header::AUTHORIZATION;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{info, warn};

use burrow_shared::protocol::{ClientMessage, ServerMessage};
use burrow_shared::{Error, Result};

use crate::local::{self, ForwardCall, LOCAL_TIMEOUT};
use crate::tls;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything needed to run one tunnel.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Relay tunnel URL, `ws://host:port` or `wss://host:port`.
    pub tunnel_url: String,
    /// Client token presented as a bearer credential.
    pub token: String,
    /// Hostname to claim.
    pub hostname: String,
    /// Base URL of the local service, e.g. `http://localhost:8080`.
    pub local_url: String,
}

/// Connects, registers, and serves requests until the stream closes.
/// Returns `Ok(())` on a clean close (including eviction by a newer
/// registration) and `Err(Error::Registration)` on a nack.
pub async fn run_tunnel(opts: ConnectOptions) -> Result<()> {
    let (mut sink, mut stream) = open_stream(&opts).await?;

    send(
        &mut sink,
        &ClientMessage::Register {
            hostname: opts.hostname.clone(),
            local_url: opts.local_url.clone(),
        },
    )
    .await?;

    await_ack(&mut stream).await?;
    info!("tunnel active: {} -> {}", opts.hostname, opts.local_url);

    let http = reqwest::Client::builder()
        .timeout(LOCAL_TIMEOUT)
        .build()
        .map_err(|err| Error::Connection(err.to_string()))?;

    while let Some(msg) = stream.next().await {
        let msg = msg.map_err(|err| Error::Connection(err.to_string()))?;
        if let Message::Close(_) = msg {
            break;
        }
        let Some(ServerMessage::ProxyRequest {
            id,
            method,
            path,
            query,
            headers,
            body,
        }) = decode(&msg)
        else {
            continue;
        };

        let call = ForwardCall {
            id: id.clone(),
            method,
            path,
            query,
            headers,
            body,
        };
        let response = match local::forward(&http, &opts.local_url, call).await {
            Ok(response) => response,
            Err(err) => {
                warn!("local call failed: {:#}", err);
                local::bad_gateway(&id)
            }
        };
        send(&mut sink, &response).await?;
    }

    info!("tunnel stream closed: {}", opts.hostname);
    Ok(())
}

async fn open_stream(
    opts: &ConnectOptions,
) -> Result<(SplitSink<WsStream, Message>, SplitStream<WsStream>)> {
    let url = format!("{}/connect", opts.tunnel_url.trim_end_matches('/'));
    let mut request = url
        .clone()
        .into_client_request()
        .map_err(|err| Error::Connection(err.to_string()))?;
    request.headers_mut().insert(
        AUTHORIZATION,
        format!("Bearer {}", opts.token)
            .parse()
            .map_err(|_| Error::Connection("token is not a valid header value".into()))?,
    );

    let (ws, _) = if url.starts_with("wss://") && tls::insecure_skip_verify() {
        let config = tls::insecure_client_config()
            .map_err(|err| Error::Connection(err.to_string()))?;
        connect_async_tls_with_config(
            request,
            None,
            false,
            Some(Connector::Rustls(Arc::new(config))),
        )
        .await
    } else {
        connect_async(request).await
    }
    .map_err(|err| Error::Connection(err.to_string()))?;

    Ok(ws.split())
}

/// Waits for the relay's answer to the register frame.
async fn await_ack(stream: &mut SplitStream<WsStream>) -> Result<()> {
    loop {
        let msg = match stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => return Err(Error::Connection(err.to_string())),
            None => return Err(Error::Connection("stream closed before ack".into())),
        };
        if let Message::Close(_) = msg {
            return Err(Error::Connection("stream closed before ack".into()));
        }
        match decode(&msg) {
            Some(ServerMessage::RegisterAck { ok: true, .. }) => return Ok(()),
            Some(ServerMessage::RegisterAck { ok: false, error }) => {
                return Err(Error::Registration(error));
            }
            Some(_) => return Err(Error::Protocol("expected register ack".into())),
            None => continue,
        }
    }
}

fn decode(msg: &Message) -> Option<ServerMessage> {
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).ok(),
        Message::Binary(data) => serde_json::from_slice(data).ok(),
        _ => None,
    }
}

async fn send(sink: &mut SplitSink<WsStream, Message>, msg: &ClientMessage) -> Result<()> {
    let frame = serde_json::to_vec(msg)?;
    sink.send(Message::Binary(frame.into()))
        .await
        .map_err(|err| Error::Connection(err.to_string()))
}
