//! Uniform error body returned for every gateway-originated failure.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::time::{Timestamp, now_utc};

pub const TOO_MANY_REQUESTS: &str = "Too Many Requests";
pub const NOT_FOUND: &str = "Not Found";
pub const SERVICE_UNAVAILABLE: &str = "Service Unavailable";
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again later.";

/// `{ error, message, timestamp }` as seen by API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
    pub timestamp: Timestamp,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            timestamp: now_utc(),
        }
    }

    pub fn too_many_requests() -> Self {
        Self::new(TOO_MANY_REQUESTS, RATE_LIMIT_MESSAGE)
    }

    /// `path` is echoed verbatim, query string included when the caller passes one.
    pub fn not_found(path: &str) -> Self {
        Self::new(
            NOT_FOUND,
            format!("The requested resource at {path} was not found."),
        )
    }

    /// `service` is the human label of the logical service, e.g. "medical records".
    pub fn service_unavailable(service: &str) -> Self {
        Self::new(
            SERVICE_UNAVAILABLE,
            format!("The {service} service is currently unavailable. Please try again later."),
        )
    }

    /// Envelope for an unexpected failure. Blank names and messages fall back to
    /// the generic wording.
    pub fn internal(name: Option<&str>, message: Option<&str>) -> Self {
        let error = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(INTERNAL_SERVER_ERROR);
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(GENERIC_MESSAGE);
        Self::new(error, message)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
