//! Health report types for the `/health` endpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::time::{Timestamp, now_utc};

/// Reachability of one backend at the moment it was probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceState {
    Up,
    Down,
}

impl ServiceState {
    pub fn is_up(self) -> bool {
        matches!(self, ServiceState::Up)
    }
}

/// Top-level status reported by the gateway itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayStatus {
    Up,
    Warning,
}

/// Successful aggregation. The gateway stays `UP` regardless of backend states;
/// per-backend results live in `services`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: GatewayStatus,
    pub timestamp: Timestamp,
    pub services: BTreeMap<String, ServiceState>,
}

impl HealthReport {
    pub fn new(services: BTreeMap<String, ServiceState>) -> Self {
        Self {
            status: GatewayStatus::Up,
            timestamp: now_utc(),
            services,
        }
    }

    pub fn all_up(&self) -> bool {
        self.services.values().all(|s| s.is_up())
    }
}

/// Body returned when the probing logic itself failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthFailure {
    pub status: GatewayStatus,
    pub timestamp: Timestamp,
    pub message: String,
    pub error: String,
}

impl HealthFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: GatewayStatus::Warning,
            timestamp: now_utc(),
            message: "Could not check health of all services".to_string(),
            error: error.into(),
        }
    }
}
