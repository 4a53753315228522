//! Public front-end.
//!
//! Routes every inbound request by virtual hostname: looks up the
//! owning tunnel, buffers the body, dispatches, and writes the
//! correlated response back. Requests for the server's own hostname
//! get a short plain-text info page instead of a 404.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::endpoint::ProxyRequest;
use crate::ServerState;

/// Outer bound on one proxied request, slightly above the endpoint's
/// own response deadline so the endpoint decides first.
const DISPATCH_DEADLINE: Duration = Duration::from_secs(65);

pub async fn handle(State(state): State<Arc<ServerState>>, req: Request) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())
        .unwrap_or_default();
    let hostname = host_without_port(host).to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();

    let Some(endpoint) = state.registry.lookup(&hostname) else {
        if !hostname.is_empty() && hostname == host_without_port(&state.config.hostname) {
            info!("proxy host={} {} {} 200 (server info)", hostname, method, path);
            return info_page(&state.config.hostname);
        }
        info!("proxy host={} {} {} 404 no tunnel", hostname, method, path);
        return (StatusCode::NOT_FOUND, "no tunnel for this hostname").into_response();
    };

    let headers = req.headers().clone();
    let body = match axum::body::to_bytes(req.into_body(), state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(_) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let proxy_req = ProxyRequest {
        id: String::new(),
        method: method.to_string(),
        path: path.clone(),
        query,
        headers,
        body,
    };

    let resp = match timeout(DISPATCH_DEADLINE, endpoint.dispatch(proxy_req)).await {
        Ok(Some(resp)) => resp,
        _ => {
            warn!("proxy host={} {} {} tunnel unavailable", hostname, method, path);
            return (StatusCode::BAD_GATEWAY, "tunnel unavailable").into_response();
        }
    };

    info!("proxy host={} {} {} {}", hostname, method, path, resp.status);

    let mut builder =
        Response::builder().status(StatusCode::from_u16(resp.status).unwrap_or(StatusCode::OK));
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in resp.headers.iter() {
            headers.append(name, value.clone());
        }
    }
    builder
        .body(Body::from(resp.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn info_page(server_hostname: &str) -> Response {
    let body = format!(
        "burrow server at {server_hostname}.\n\n\
         Use a subdomain to reach your tunnel (e.g. myapp.{server_hostname}).\n\
         Create a tunnel from your machine: \
         burrow tunnel create --local localhost:8080 --subdomain myapp --name myapp \
         && burrow tunnel start myapp\n"
    );
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Strips the port from a Host header value. IPv6 literals keep their
/// brackets: `[::1]:80` becomes `[::1]`.
pub fn host_without_port(host: &str) -> &str {
    if host.starts_with('[') {
        if let Some(end) = host.find(']') {
            return &host[..=end];
        }
    }
    match host.find(':') {
        Some(idx) => &host[..idx],
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::DomainStore;
    use bytes::Bytes;
    use crate::endpoint::{ProxyResponse, TunnelEndpoint};
    use crate::{web_router, Config, ServerState, DEFAULT_MAX_BODY_BYTES};
    use async_trait::async_trait;
    use http::HeaderValue;
    use tower::ServiceExt;

    #[test]
    fn host_without_port_cases() {
        let cases = [
            ("example.com", "example.com"),
            ("example.com:443", "example.com"),
            ("localhost:8080", "localhost"),
            ("[::1]:80", "[::1]"),
            ("[::1]", "[::1]"),
            ("", ""),
        ];
        for (host, want) in cases {
            assert_eq!(host_without_port(host), want, "host {host:?}");
        }
    }

    struct CannedEndpoint {
        response: Option<ProxyResponse>,
    }

    #[async_trait]
    impl TunnelEndpoint for CannedEndpoint {
        async fn dispatch(&self, req: ProxyRequest) -> Option<ProxyResponse> {
            self.response.clone().map(|mut resp| {
                resp.id = req.id;
                resp
            })
        }

        fn peer_addr(&self) -> String {
            "127.0.0.1:5555".into()
        }

        fn close(&self) {}
    }

    async fn test_state() -> Arc<ServerState> {
        let dir = tempfile::tempdir().unwrap();
        let domains = DomainStore::open(dir.path()).await.unwrap();
        Arc::new(ServerState::new(
            Config {
                hostname: "tunnel.example.com".into(),
                web_port: 0,
                tunnel_port: 0,
                client_token: "client-token".into(),
                admin_token: "admin-token".into(),
                data_dir: dir.keep(),
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            },
            domains,
        ))
    }

    fn get(host: &str, path: &str) -> Request {
        Request::builder()
            .uri(path)
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_hostname_is_404() {
        let state = test_state().await;
        let resp = web_router(state)
            .oneshot(get("unknown.example.com", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"no tunnel for this hostname");
    }

    #[tokio::test]
    async fn server_hostname_serves_info_page() {
        let state = test_state().await;
        let resp = web_router(state)
            .oneshot(get("tunnel.example.com", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("burrow server at tunnel.example.com"));
    }

    #[tokio::test]
    async fn closed_tunnel_is_502() {
        let state = test_state().await;
        state
            .registry
            .register("app.example.com", Arc::new(CannedEndpoint { response: None }));
        let resp = web_router(state)
            .oneshot(get("app.example.com", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"tunnel unavailable");
    }

    #[tokio::test]
    async fn host_port_is_stripped_for_lookup() {
        let state = test_state().await;
        state.registry.register(
            "app.example.com",
            Arc::new(CannedEndpoint {
                response: Some(ProxyResponse {
                    id: String::new(),
                    status: 204,
                    headers: http::HeaderMap::new(),
                    body: Bytes::new(),
                }),
            }),
        );
        let resp = web_router(state)
            .oneshot(get("app.example.com:443", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn response_headers_copied_multi_valued() {
        let mut headers = http::HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("x-upstream", HeaderValue::from_static("yes"));

        let state = test_state().await;
        state.registry.register(
            "app.example.com",
            Arc::new(CannedEndpoint {
                response: Some(ProxyResponse {
                    id: String::new(),
                    status: 201,
                    headers,
                    body: Bytes::from_static(b"created"),
                }),
            }),
        );

        let resp = web_router(state)
            .oneshot(get("app.example.com", "/make"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let cookies: Vec<_> = resp.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);
        assert_eq!(resp.headers().get("x-upstream").unwrap(), "yes");
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"created");
    }
}
