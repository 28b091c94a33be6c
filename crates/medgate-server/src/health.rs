//! Backend health aggregation for `GET /health`.
//!
//! Every configured service is probed at `<base url>/health` in its own task.
//! A probe that answers 2xx within the timeout is `UP`; transport errors,
//! non-2xx answers and timeouts are `DOWN`. Only failures of the probing
//! machinery itself surface as [`HealthError`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use medgate_core::{HealthReport, ServiceState};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("cannot build health probe for {service}: {reason}")]
    InvalidTarget { service: String, reason: String },

    #[error("health probe for {service} aborted: {reason}")]
    ProbeAborted { service: String, reason: String },

    #[error("health client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// A backend whose `/health` endpoint is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTarget {
    pub name: String,
    pub url: String,
}

impl HealthTarget {
    /// Health endpoint for a service base URL; trailing slashes are ignored.
    pub fn for_service(name: impl Into<String>, base_url: &str) -> Self {
        Self {
            name: name.into(),
            url: format!("{}/health", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probes one target. `Err` means the probe could not be performed at all.
    async fn probe(&self, target: &HealthTarget) -> Result<ServiceState, HealthError>;
}

/// Probe issuing a plain `GET` with `reqwest`.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, HealthError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, target: &HealthTarget) -> Result<ServiceState, HealthError> {
        let url = Url::parse(&target.url).map_err(|e| HealthError::InvalidTarget {
            service: target.name.clone(),
            reason: e.to_string(),
        })?;

        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(ServiceState::Up),
            Ok(resp) => {
                debug!(service = %target.name, status = %resp.status(), "Health probe answered non-2xx");
                Ok(ServiceState::Down)
            }
            Err(e) => {
                debug!(service = %target.name, error = %e, "Health probe failed");
                Ok(ServiceState::Down)
            }
        }
    }
}

pub struct HealthAggregator {
    probe: Arc<dyn HealthProbe>,
    targets: Vec<HealthTarget>,
    timeout: Duration,
}

impl HealthAggregator {
    pub fn new(probe: Arc<dyn HealthProbe>, targets: Vec<HealthTarget>, timeout: Duration) -> Self {
        Self {
            probe,
            targets,
            timeout,
        }
    }

    /// One target per configured service, probed over HTTP.
    pub fn from_config(config: &AppConfig) -> Result<Self, HealthError> {
        let targets = config
            .services
            .iter()
            .map(|(name, service)| HealthTarget::for_service(name, &service.url))
            .collect();
        Ok(Self::new(
            Arc::new(HttpProbe::new()?),
            targets,
            config.health.probe_timeout(),
        ))
    }

    pub fn targets(&self) -> &[HealthTarget] {
        &self.targets
    }

    /// Probes every target concurrently. Never cached.
    pub async fn check(&self) -> Result<HealthReport, HealthError> {
        let handles = self.targets.iter().cloned().map(|target| {
            let probe = Arc::clone(&self.probe);
            let timeout = self.timeout;
            let name = target.name.clone();
            let handle = tokio::spawn(async move {
                match tokio::time::timeout(timeout, probe.probe(&target)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(service = %target.name, timeout_ms = timeout.as_millis() as u64, "Health probe timed out");
                        Ok(ServiceState::Down)
                    }
                }
            });
            async move { (name, handle.await) }
        });

        let mut services = BTreeMap::new();
        for (name, joined) in join_all(handles).await {
            let state = joined.map_err(|e| HealthError::ProbeAborted {
                service: name.clone(),
                reason: e.to_string(),
            })??;
            services.insert(name, state);
        }

        Ok(HealthReport::new(services))
    }
}
