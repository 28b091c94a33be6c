//! Forwarding of matched requests to backend services.

use async_trait::async_trait;
use axum::{
    body::{Body, HttpBody},
    http::{HeaderMap, HeaderName, Request, header},
    response::Response,
};
use thiserror::Error;
use tracing::{debug, instrument};

use super::types::RouteRule;
use crate::config::ProxyConfig;

/// Transport-level failures talking to a backend.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request path could not be turned into a valid upstream URL.
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),
}

impl UpstreamError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            Self::Connect {
                url: url.to_string(),
                source: err,
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Relays one request to the backend selected by a [`RouteRule`].
///
/// Implementations return the backend response as-is (status, headers, body),
/// including backend error statuses. Only transport failures are errors.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        request: Request<Body>,
        rule: &RouteRule,
    ) -> Result<Response, UpstreamError>;
}

/// [`Forwarder`] backed by a shared `reqwest` client.
///
/// Bodies are streamed in both directions. Redirects are passed through to the
/// caller rather than followed.
#[derive(Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    #[instrument(skip(self, request, rule), fields(route = %rule.prefix, service = %rule.service))]
    async fn forward(
        &self,
        request: Request<Body>,
        rule: &RouteRule,
    ) -> Result<Response, UpstreamError> {
        let (parts, body) = request.into_parts();
        let url = rule
            .upstream_url(parts.uri.path(), parts.uri.query())
            .map_err(|e| UpstreamError::InvalidTarget(e.to_string()))?;

        debug!(method = %parts.method, upstream = %url, "Proxying request");

        let mut builder = self
            .client
            .request(parts.method, url.clone())
            .headers(forwardable_headers(&parts.headers));

        // Empty bodies are sent without a body so GET/DELETE stay plain requests.
        if body.size_hint().exact() != Some(0) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = builder
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(url.as_str(), e))?;

        let status = upstream.status();
        debug!(status = %status, upstream = %url, "Upstream responded");

        let headers = forwardable_headers(upstream.headers());
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Copies `headers`, dropping hop-by-hop headers, anything named in
/// `Connection`, and `Host` (the client sets it from the target URL).
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::try_from(token.trim()).ok())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name) || connection_listed.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Connection-scoped headers (RFC 9110 §7.6.1) plus `Host`.
const HOP_BY_HOP: [HeaderName; 10] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}
