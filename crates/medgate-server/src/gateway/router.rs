//! Prefix-based route table and the catch-all gateway handler.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
};
use tracing::debug;
use url::Url;

use crate::config::AppConfig;
use crate::server::AppState;

use super::error::GatewayError;
use super::proxy::UpstreamError;
use super::types::RouteRule;

/// Immutable, ordered set of proxy rules built once at startup.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// Resolves every configured route against its service's base URL.
    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        let rules = config
            .routes
            .iter()
            .map(|route| {
                let service = config.services.get(&route.service).ok_or_else(|| {
                    GatewayError::InvalidConfig(format!(
                        "route '{}' references unknown service '{}'",
                        route.prefix, route.service
                    ))
                })?;
                let target = Url::parse(&service.url).map_err(|e| {
                    GatewayError::InvalidConfig(format!(
                        "service '{}' has invalid url '{}': {e}",
                        route.service, service.url
                    ))
                })?;
                Ok(RouteRule {
                    prefix: route.prefix.clone(),
                    service: route.service.clone(),
                    display_name: route.display_name.clone(),
                    target,
                    rewrite: route.rewrite.clone(),
                })
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;

        Ok(Self::new(rules))
    }

    /// First rule whose prefix matches `path`.
    pub fn match_path(&self, path: &str) -> Option<&RouteRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Fallback handler: proxies requests under a configured prefix and turns
/// everything else into a 404 envelope.
pub async fn gateway_fallback_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let path = request.uri().path().to_string();

    let Some(rule) = state.routes.match_path(&path) else {
        let shown = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or(path);
        return Err(GatewayError::RouteNotFound { path: shown });
    };

    debug!(method = %request.method(), path = %path, route = %rule.prefix, "Gateway dispatch");

    state
        .forwarder
        .forward(request, rule)
        .await
        .map_err(|source| match source {
            UpstreamError::InvalidTarget(detail) => GatewayError::Declared {
                status: StatusCode::BAD_REQUEST,
                name: "Bad Request".to_string(),
                message: format!("The request path could not be forwarded: {detail}"),
            },
            source => GatewayError::UpstreamUnavailable {
                route: rule.prefix.clone(),
                display_name: rule.display_name.clone(),
                source,
            },
        })
}
