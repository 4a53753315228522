//! Wire protocol for the tunnel stream.
//!
//! Messages travel as JSON-encoded tagged unions over a single
//! bidirectional WebSocket per client. The first client frame must be
//! `register`; after the ack, the server pushes `proxy_request` frames
//! and the client answers each with a `proxy_response` carrying the
//! same correlation id.

use std::collections::HashMap;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// Frames sent by the tunnel client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register {
        hostname: String,
        local_url: String,
    },
    ProxyResponse {
        id: String,
        status: u16,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Vec<u8>,
    },
}

/// Frames sent by the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RegisterAck {
        ok: bool,
        #[serde(default)]
        error: String,
    },
    ProxyRequest {
        id: String,
        method: String,
        path: String,
        #[serde(default)]
        query: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Vec<u8>,
    },
}

/// Flattens a multi-valued header map into the single-valued wire form,
/// joining repeated values with `", "`. Values that are not valid UTF-8
/// are skipped.
pub fn headers_to_wire(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            out.insert(name.as_str().to_string(), joined);
        }
    }
    out
}

/// Rebuilds a header map from the wire form. Each wire entry becomes a
/// single header value; names or values that do not parse are dropped.
pub fn headers_from_wire(wire: &HashMap<String, String>) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in wire {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            out.insert(name, value);
        }
    }
    out
}
