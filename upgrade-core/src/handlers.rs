//! hudsucker handler feeding proxied traffic through the interceptor.

use crate::error::InterceptError;
use crate::fetch::FetchResponse;
use crate::request::{
    CredentialsPolicy, InterceptedRequest, RedirectPolicy, RequestBody, RequestMode,
};
use crate::service::GuardService;
use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use futures::SinkExt;
use http::header::{HeaderName, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, REFERER, UPGRADE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use hudsucker::{
    hyper::{self, body::HttpBody, Body, Request, Response},
    HttpContext, HttpHandler, RequestOrResponse,
};
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Bodies up to this size are buffered; larger ones are streamed
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct UpgradeHandler {
    service: Arc<GuardService>,
    max_body_size: usize,
}

impl UpgradeHandler {
    pub fn new(service: Arc<GuardService>) -> Self {
        Self {
            service,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }
}

fn header_has_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// WebSocket handshake; hudsucker upgrades these itself
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    header_has_token(req.headers(), CONNECTION, "upgrade")
        && header_has_token(req.headers(), UPGRADE, "websocket")
}

/// Requests that bypass interception and go back to hudsucker untouched
pub fn bypasses_interception<B>(req: &Request<B>) -> bool {
    req.method() == Method::CONNECT || is_upgrade_request(req)
}

/// Drop headers that only apply to a single connection
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Forward `head` and then the rest of `body` as a single-read stream.
fn stream_body(head: Vec<Bytes>, mut body: Body) -> RequestBody {
    let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(8);
    tokio::spawn(async move {
        for chunk in head {
            if tx.send(Ok(chunk)).await.is_err() {
                return;
            }
        }
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e));
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() || failed {
                return;
            }
        }
    });
    RequestBody::Stream(Box::pin(rx))
}

/// Buffer `body` up to `max_body_size`. A body declared or found to be
/// larger is handed on as a stream instead.
pub async fn read_body(
    mut body: Body,
    declared_len: Option<u64>,
    max_body_size: usize,
) -> Result<RequestBody, hyper::Error> {
    if declared_len.map_or(false, |len| len > max_body_size as u64) {
        debug!(
            "Declared body of {:?} bytes exceeds limit {}, streaming",
            declared_len, max_body_size
        );
        return Ok(stream_body(Vec::new(), body));
    }

    let mut chunks = Vec::new();
    let mut size = 0usize;
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        size += chunk.len();
        chunks.push(chunk);
        if size > max_body_size {
            debug!("Body passed limit {} while reading, streaming", max_body_size);
            return Ok(stream_body(chunks, body));
        }
    }

    let mut buffered = BytesMut::with_capacity(size);
    for chunk in chunks {
        buffered.extend_from_slice(&chunk);
    }
    Ok(buffered.freeze().into())
}

/// Build the interception snapshot of a proxied request. Bodies within
/// `max_body_size` are buffered so the mandatory clone can be taken.
pub async fn to_intercepted(
    req: Request<Body>,
    max_body_size: usize,
) -> Result<InterceptedRequest, hyper::Error> {
    let (parts, body) = req.into_parts();
    let declared_len = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = read_body(body, declared_len, max_body_size).await?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);

    let mode = headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .map(RequestMode::from_token)
        .unwrap_or_default();
    let referrer = headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let referrer_policy = headers
        .get("referrer-policy")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Redirects go back to the client, which decides whether to follow.
    let mut request = InterceptedRequest::new(parts.method, parts.uri.to_string())
        .with_headers(headers)
        .with_mode(mode)
        .with_credentials(CredentialsPolicy::Include)
        .with_redirect(RedirectPolicy::Manual)
        .with_body(body);
    if let Some(referrer) = referrer {
        request = request.with_referrer(referrer);
    }
    if let Some(policy) = referrer_policy {
        request = request.with_referrer_policy(policy);
    }
    Ok(request)
}

pub fn to_response(fetched: FetchResponse) -> Response<Body> {
    let mut headers = fetched.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(CONTENT_LENGTH);

    let mut response = Response::new(Body::from(fetched.body));
    *response.status_mut() = fetched.status;
    *response.headers_mut() = headers;
    response
}

fn error_response(status: StatusCode, message: String) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

pub fn bad_gateway(error: &InterceptError) -> Response<Body> {
    error_response(StatusCode::BAD_GATEWAY, error.to_string())
}

#[async_trait::async_trait]
impl HttpHandler for UpgradeHandler {
    async fn handle_request(&mut self, ctx: &HttpContext, req: Request<Body>) -> RequestOrResponse {
        let metrics = self.service.metrics().clone();
        metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        // Tunnels are opened by hudsucker; the requests inside come back here.
        // WebSocket handshakes need their Upgrade headers intact.
        if bypasses_interception(&req) {
            debug!("Passing {} {} to hudsucker", req.method(), req.uri());
            return RequestOrResponse::Request(req);
        }

        let client = ctx.client_addr.ip().to_string();
        if !self.service.controls(&client).await {
            metrics.uncontrolled_requests.fetch_add(1, Ordering::Relaxed);
            debug!("Client {} not controlled, forwarding {} untouched", client, req.uri());
            return RequestOrResponse::Request(req);
        }

        let request = match to_intercepted(req, self.max_body_size).await {
            Ok(request) => request,
            Err(e) => {
                warn!("Failed to read request body from {}: {}", client, e);
                return RequestOrResponse::Response(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unreadable request body: {}", e),
                ));
            }
        };

        match self.service.handle(request).await {
            Ok(fetched) => RequestOrResponse::Response(to_response(fetched)),
            Err(e) => {
                warn!("Interception failed: {}", e);
                RequestOrResponse::Response(bad_gateway(&e))
            }
        }
    }
}
