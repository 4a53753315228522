//! Tunnel endpoint: the server-side handle to one connected client.
//!
//! Dispatch multiplexes concurrent public requests over the client's
//! single stream via correlation ids. Each in-flight request owns an
//! entry in the pending table; the stream reader resolves it when the
//! matching response arrives, and `close` wakes every waiter by
//! dropping its inbox.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::header::HeaderMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use uuid::Uuid;

use burrow_shared::protocol::{headers_to_wire, ServerMessage};

/// Capacity of the per-endpoint outbound queue. A slow client causes
/// new dispatches for its hostname to block here until the caller's
/// deadline expires.
pub const OUTBOUND_CAPACITY: usize = 64;

/// How long dispatch waits for the client's response, independent of
/// the caller's own deadline.
const RESPONSE_DEADLINE: Duration = Duration::from_secs(60);

/// One inbound public request on its way to a client.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Correlation id; assigned by dispatch when empty.
    pub id: String,
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The client's answer, correlated by id.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub id: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Capability set of one connected client. The registry and front-end
/// depend only on this trait, keeping them transport-independent.
#[async_trait]
pub trait TunnelEndpoint: Send + Sync {
    /// Sends the request to the client and waits for the matching
    /// response. Returns `None` when the endpoint is closed, the
    /// per-request deadline elapses, or the request cannot be queued.
    async fn dispatch(&self, req: ProxyRequest) -> Option<ProxyResponse>;

    /// Remote peer address, for observability.
    fn peer_addr(&self) -> String;

    /// Idempotent. Stops the outbound queue and wakes every pending
    /// waiter with the closed signal.
    fn close(&self);
}

/// WebSocket-backed endpoint. The stream's writer task consumes the
/// outbound queue; its reader task resolves pending entries.
pub struct WsEndpoint {
    hostname: String,
    peer: String,
    outbound: Mutex<Option<mpsc::Sender<ServerMessage>>>,
    pending: DashMap<String, oneshot::Sender<ProxyResponse>>,
    closed: AtomicBool,
}

impl WsEndpoint {
    pub fn new(hostname: String, peer: String, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            hostname,
            peer,
            outbound: Mutex::new(Some(outbound)),
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Resolves the pending entry for a response, if its waiter is
    /// still there. Unknown ids are dropped silently; the waiter may
    /// already have given up.
    pub(crate) fn deliver(&self, resp: ProxyResponse) {
        if let Some((_, inbox)) = self.pending.remove(&resp.id) {
            let _ = inbox.send(resp);
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<ServerMessage>> {
        self.outbound.lock().expect("outbound lock").clone()
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Removes the pending entry on every dispatch exit path, including
/// cancellation by future drop.
struct PendingGuard<'a> {
    pending: &'a DashMap<String, oneshot::Sender<ProxyResponse>>,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

#[async_trait]
impl TunnelEndpoint for WsEndpoint {
    async fn dispatch(&self, mut req: ProxyRequest) -> Option<ProxyResponse> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        if req.id.is_empty() {
            req.id = Uuid::new_v4().to_string();
        }
        let id = req.id.clone();

        let (inbox_tx, inbox_rx) = oneshot::channel();
        self.pending.insert(id.clone(), inbox_tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        // Acquiring the sender after inserting the entry guarantees a
        // concurrent close either sees the entry or leaves no sender.
        let sender = self.sender()?;
        let msg = ServerMessage::ProxyRequest {
            id: id.clone(),
            method: req.method,
            path: req.path,
            query: req.query,
            headers: headers_to_wire(&req.headers),
            body: req.body.to_vec(),
        };
        if sender.send(msg).await.is_err() {
            return None;
        }

        match timeout(RESPONSE_DEADLINE, inbox_rx).await {
            Ok(Ok(resp)) => Some(resp),
            // Inbox dropped: the endpoint closed while we waited.
            Ok(Err(_)) => None,
            // Per-request deadline.
            Err(_) => None,
        }
    }

    fn peer_addr(&self) -> String {
        self.peer.clone()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the sender ends the writer task once the queue
        // drains; clearing pending drops every inbox, waking waiters.
        self.outbound.lock().expect("outbound lock").take();
        self.pending.clear();
    }
}
