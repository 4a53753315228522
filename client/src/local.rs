//! Local forwarder.
//!
//! Translates a pushed tunnel request into an HTTP call against the
//! local service and packages the answer for the wire. Hop-by-hop and
//! tunnel-internal headers are dropped in both directions.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

use burrow_shared::protocol::{headers_to_wire, ClientMessage};

/// Deadline for one call against the local service.
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Request headers never forwarded to the local service.
const SKIPPED_REQUEST_HEADERS: [&str; 3] = ["connection", "host", "content-length"];

/// Response headers never sent back over the tunnel; the relay writes
/// the body as one buffered unit and sets its own framing.
const SKIPPED_RESPONSE_HEADERS: [&str; 5] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "upgrade",
];

/// One request pulled off the tunnel stream, in wire form.
#[derive(Debug, Clone)]
pub struct ForwardCall {
    pub id: String,
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Forwards the call to `local_url` and returns the wire response.
pub async fn forward(
    http: &reqwest::Client,
    local_url: &str,
    call: ForwardCall,
) -> Result<ClientMessage> {
    let mut target = format!("{}{}", local_url.trim_end_matches('/'), call.path);
    if !call.query.is_empty() {
        target.push('?');
        target.push_str(&call.query);
    }

    let method = Method::from_bytes(call.method.as_bytes())
        .with_context(|| format!("method {:?}", call.method))?;

    let mut headers = HeaderMap::new();
    for (name, value) in &call.headers {
        if skip_request_header(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    let resp = http
        .request(method, &target)
        .headers(headers)
        .body(call.body)
        .send()
        .await
        .with_context(|| format!("call {target}"))?;

    let status = resp.status().as_u16();
    let mut resp_headers = resp.headers().clone();
    for name in SKIPPED_RESPONSE_HEADERS {
        resp_headers.remove(name);
    }
    let body = resp.bytes().await.context("read local response body")?;

    Ok(ClientMessage::ProxyResponse {
        id: call.id,
        status,
        headers: headers_to_wire(&resp_headers),
        body: body.to_vec(),
    })
}

/// The response sent when the local service cannot be reached.
pub fn bad_gateway(id: &str) -> ClientMessage {
    ClientMessage::ProxyResponse {
        id: id.to_string(),
        status: 502,
        headers: HashMap::new(),
        body: b"bad gateway".to_vec(),
    }
}

fn skip_request_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SKIPPED_REQUEST_HEADERS.contains(&lower.as_str()) || lower.starts_with("x-burrow-")
}
