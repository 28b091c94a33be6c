use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    body::Body,
    http::Request,
    middleware,
    routing::get,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::gateway::{
    Forwarder, GatewayError, HttpForwarder, RouteTable, gateway_fallback_handler, panic_response,
};
use crate::health::HealthAggregator;
use crate::middleware::{self as app_middleware, RequestId};
use crate::ratelimit::FixedWindowLimiter;
use crate::handlers;

/// Shared, read-mostly state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub routes: Arc<RouteTable>,
    pub forwarder: Arc<dyn Forwarder>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub health: Arc<HealthAggregator>,
}

impl AppState {
    /// Validates `config` and builds the shared state from it.
    pub fn from_config(config: AppConfig) -> Result<Self, GatewayError> {
        config.validate().map_err(GatewayError::InvalidConfig)?;
        let routes = RouteTable::from_config(&config)?;
        let forwarder = HttpForwarder::new(&config.proxy)
            .map_err(|e| GatewayError::InvalidConfig(format!("proxy client: {e}")))?;
        let health = HealthAggregator::from_config(&config)
            .map_err(|e| GatewayError::InvalidConfig(e.to_string()))?;
        let limiter = FixedWindowLimiter::from_config(&config.rate_limit);

        Ok(Self {
            config: Arc::new(config),
            routes: Arc::new(routes),
            forwarder: Arc::new(forwarder),
            limiter: Arc::new(limiter),
            health: Arc::new(health),
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        // Local endpoints; other methods fall through to the 404 envelope
        .route(
            "/health",
            get(handlers::health).fallback(gateway_fallback_handler),
        )
        .route(
            "/api-docs",
            get(handlers::api_docs).fallback(gateway_fallback_handler),
        )
        // Everything else is proxied or rejected as not found
        .fallback(gateway_fallback_handler)
        // Middleware stack (inner to outer: rate limit -> cors -> trace -> request id -> panic guard)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::rate_limit,
        ))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<Body>| {
                    let req_id = req
                        .extensions()
                        .get::<RequestId>()
                        .and_then(|id| id.0.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Serves `app` on `listener` until `shutdown` resolves, then drains
/// in-flight requests. Peer addresses are exposed for rate limiting.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

pub struct GatewayServer {
    addr: SocketAddr,
    state: AppState,
}

pub struct ServerBuilder {
    addr: Option<SocketAddr>,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            addr: None,
            config: AppConfig::default(),
        }
    }

    /// Overrides the address derived from `server.host` / `server.port`.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    pub fn build(self) -> Result<GatewayServer, GatewayError> {
        let addr = match self.addr {
            Some(addr) => addr,
            None => self.config.addr().map_err(GatewayError::InvalidConfig)?,
        };
        let state = AppState::from_config(self.config)?;
        Ok(GatewayServer { addr, state })
    }
}

impl GatewayServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        self.run_with_listener(listener, shutdown_signal()).await
    }

    /// Runs on an already bound listener until `shutdown` resolves.
    pub async fn run_with_listener<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr().context("listener has no local address")?;

        let sweeper = self.state.config.rate_limit.enabled.then(|| {
            self.state
                .limiter
                .spawn_sweeper(self.state.config.rate_limit.sweep_interval())
        });

        for rule in self.state.routes.rules() {
            tracing::info!(
                prefix = %rule.prefix,
                service = %rule.service,
                target = %rule.target,
                "Proxy route"
            );
        }
        tracing::info!(
            addr = %local_addr,
            max_requests = self.state.config.rate_limit.max_requests,
            window_ms = self.state.config.rate_limit.window_ms,
            "API gateway listening"
        );

        let result = serve(listener, build_app(self.state), shutdown).await;

        if let Some(handle) = sweeper {
            handle.abort();
        }
        result.context("server error")?;
        tracing::info!("API gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut cfg = AppConfig::default();
        cfg.rate_limit.max_requests = 0;
        let err = ServerBuilder::new().with_config(cfg).build().err().unwrap();
        assert!(matches!(err, GatewayError::InvalidConfig(ref m) if m.contains("max_requests")));

        let mut cfg = AppConfig::default();
        let dup = cfg.routes[0].clone();
        cfg.routes.push(dup);
        assert!(AppState::from_config(cfg).is_err());

        let mut cfg = AppConfig::default();
        cfg.rate_limit.sweep_interval_ms = 0;
        assert!(ServerBuilder::new().with_config(cfg).build().is_err());

        let mut cfg = AppConfig::default();
        cfg.server.host = "localhost".into();
        assert!(ServerBuilder::new().with_config(cfg).build().is_err());
    }

    #[test]
    fn test_build_uses_configured_address() {
        let mut cfg = AppConfig::default();
        cfg.server.host = "127.0.0.1".into();
        cfg.server.port = 8089;
        let server = ServerBuilder::new().with_config(cfg).build().unwrap();
        assert_eq!(server.addr(), "127.0.0.1:8089".parse().unwrap());

        let override_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = ServerBuilder::new().with_addr(override_addr).build().unwrap();
        assert_eq!(server.addr(), override_addr);
    }
}
