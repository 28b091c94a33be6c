use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::gateway::GatewayError;
use crate::ratelimit::Admission;
use crate::server::AppState;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Key used when the peer address is unknown (e.g. in-process tests).
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Identifier of the request, stored in extensions by [`request_id`].
#[derive(Debug, Clone)]
pub struct RequestId(pub HeaderValue);

pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    // Keep a caller-supplied id; otherwise generate one
    let req_id_value = req
        .headers()
        .get(&X_REQUEST_ID)
        .cloned()
        .unwrap_or_else(new_request_id);

    req.extensions_mut().insert(RequestId(req_id_value.clone()));

    let mut res = next.run(req).await;
    res.headers_mut().insert(X_REQUEST_ID, req_id_value);
    res
}

fn new_request_id() -> HeaderValue {
    // A hyphenated UUID is always a valid header value
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

/// Admission control in front of every route, local or proxied.
///
/// Rejected requests get a 429 envelope and never reach a handler.
pub async fn rate_limit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(req).await;
    }

    let key = client_key(&req, state.config.rate_limit.trust_forwarded_for);
    match state.limiter.check(&key) {
        Admission::Admitted { count } => {
            tracing::trace!(client = %key, count, "Request admitted");
            next.run(req).await
        }
        Admission::Rejected { retry_after } => {
            tracing::warn!(
                client = %key,
                path = %req.uri().path(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            GatewayError::RateLimited { retry_after }.into_response()
        }
    }
}

/// Rate-limit key for a request: the peer IP, or the left-most
/// `X-Forwarded-For` entry when the gateway sits behind a trusted proxy.
pub fn client_key(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}
