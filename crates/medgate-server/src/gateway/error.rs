//! Gateway-specific error types and their JSON rendering.
//!
//! Every error response the gateway produces on its own behalf (as opposed to a
//! relayed backend response) goes through [`GatewayError::into_response`] and
//! carries an [`ErrorEnvelope`] body.

use std::any::Any;
use std::time::Duration;

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use medgate_core::ErrorEnvelope;
use medgate_core::envelope::GENERIC_MESSAGE;
use thiserror::Error;

use super::proxy::UpstreamError;

/// Sent if the envelope itself cannot be serialized.
const FALLBACK_BODY: &str =
    r#"{"error":"Internal Server Error","message":"Something went wrong. Please try again later."}"#;

/// Gateway-specific errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client exceeded its request budget for the current window.
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    /// No proxy rule or local handler for the path.
    #[error("No route found for {path}")]
    RouteNotFound { path: String },

    /// The backend behind a route could not be reached.
    #[error("{display_name} service unavailable via {route}: {source}")]
    UpstreamUnavailable {
        route: String,
        display_name: String,
        #[source]
        source: UpstreamError,
    },

    /// Invalid gateway configuration.
    #[error("Invalid gateway configuration: {0}")]
    InvalidConfig(String),

    /// Failure that declares its own status and name.
    #[error("{name}: {message}")]
    Declared {
        status: StatusCode,
        name: String,
        message: String,
    },

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Declared { status, .. } => *status,
            Self::InvalidConfig(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body sent to the client. Internal details stay in the logs.
    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            Self::RateLimited { .. } => ErrorEnvelope::too_many_requests(),
            Self::RouteNotFound { path } => ErrorEnvelope::not_found(path),
            Self::UpstreamUnavailable { display_name, .. } => {
                ErrorEnvelope::service_unavailable(display_name)
            }
            Self::Declared { name, message, .. } => {
                ErrorEnvelope::internal(Some(name.as_str()), Some(message.as_str()))
            }
            Self::InvalidConfig(_) | Self::Internal(_) => {
                ErrorEnvelope::internal(None, Some(GENERIC_MESSAGE))
            }
        }
    }

    fn log(&self) {
        match self {
            Self::RateLimited { .. } | Self::RouteNotFound { .. } => {
                tracing::debug!(error = %self, "Request rejected by gateway");
            }
            Self::UpstreamUnavailable {
                route,
                display_name,
                source,
            } => {
                tracing::error!(
                    route = %route,
                    service = %display_name,
                    error = %source,
                    "Proxy error"
                );
            }
            Self::Declared { status, .. } if status.is_client_error() => {
                tracing::warn!(error = %self, "Request failed");
            }
            _ => tracing::error!(error = %self, "Request failed"),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status();
        let body = self
            .envelope()
            .to_json_bytes()
            .unwrap_or_else(|_| FALLBACK_BODY.as_bytes().to_vec());
        let mut response = (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response();

        if let Self::RateLimited { retry_after } = &self {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }

        response
    }
}

/// Turns a handler panic into a 500 envelope; used with `CatchPanicLayer`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    GatewayError::Internal(format!("handler panicked: {detail}")).into_response()
}
