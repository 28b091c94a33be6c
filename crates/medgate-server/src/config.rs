use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

/// Name of the single backend the default route table points at.
pub const PATIENT_SERVICE: &str = "patient-service";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Backend services by name
    #[serde(default = "default_services")]
    pub services: BTreeMap<String, ServiceConfig>,
    /// Ordered proxy routes; first matching prefix wins
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            services: default_services(),
            routes: default_routes(),
            rate_limit: RateLimitConfig::default(),
            proxy: ProxyConfig::default(),
            health: HealthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        self.addr()?;
        // Services
        if self.services.is_empty() {
            return Err("at least one service must be configured".into());
        }
        for (name, service) in &self.services {
            let url = url::Url::parse(&service.url)
                .map_err(|e| format!("services.{name}.url is invalid: {e}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(format!("services.{name}.url must use http or https"));
            }
            if url.query().is_some() || url.fragment().is_some() {
                return Err(format!(
                    "services.{name}.url must not carry a query or fragment"
                ));
            }
        }
        // Routes
        if self.routes.is_empty() {
            return Err("at least one route must be configured".into());
        }
        let mut seen = HashSet::new();
        for route in &self.routes {
            validate_prefix("routes.prefix", &route.prefix)?;
            if let Some(rewrite) = &route.rewrite {
                validate_prefix("routes.rewrite", rewrite)?;
            }
            if !seen.insert(route.prefix.as_str()) {
                return Err(format!("duplicate route prefix '{}'", route.prefix));
            }
            if !self.services.contains_key(&route.service) {
                return Err(format!(
                    "route '{}' references unknown service '{}'",
                    route.prefix, route.service
                ));
            }
            if route.display_name.trim().is_empty() {
                return Err(format!("route '{}' needs a display_name", route.prefix));
            }
        }
        // Rate limiting
        if self.rate_limit.max_requests == 0 {
            return Err("rate_limit.max_requests must be > 0".into());
        }
        if self.rate_limit.window_ms == 0 || self.rate_limit.sweep_interval_ms == 0 {
            return Err("rate_limit windows must be > 0".into());
        }
        // Timeouts
        if self.proxy.connect_timeout_ms == 0 || self.proxy.request_timeout_ms == 0 {
            return Err("proxy timeouts must be > 0".into());
        }
        if self.health.probe_timeout_ms == 0 {
            return Err("health.probe_timeout_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Listen address. `server.host` must be an IP literal; hostnames are
    /// rejected rather than widened to the unspecified address.
    pub fn addr(&self) -> Result<SocketAddr, String> {
        let host: IpAddr = self.server.host.trim().parse().map_err(|_| {
            format!(
                "server.host '{}' must be an IP address (e.g. 127.0.0.1 or 0.0.0.0)",
                self.server.host
            )
        })?;
        Ok(SocketAddr::from((host, self.server.port)))
    }

    /// Applies the variables the gateway has always honoured (`PORT`,
    /// `PATIENT_SERVICE_URL`). They win over file and prefixed env values.
    pub fn apply_legacy_env<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|p| !p.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| format!("PORT must be a valid port number: {e}"))?;
        }
        if let Some(url) = lookup("PATIENT_SERVICE_URL").filter(|u| !u.trim().is_empty()) {
            self.services
                .entry(PATIENT_SERVICE.to_string())
                .or_insert_with(|| ServiceConfig { url: String::new() })
                .url = url.trim().to_string();
        }
        Ok(())
    }
}

fn validate_prefix(field: &str, prefix: &str) -> Result<(), String> {
    if !prefix.starts_with('/') {
        return Err(format!("{field} '{prefix}' must start with '/'"));
    }
    if prefix.len() > 1 && prefix.ends_with('/') {
        return Err(format!("{field} '{prefix}' must not end with '/'"));
    }
    if prefix.contains('?') || prefix.contains('#') {
        return Err(format!("{field} '{prefix}' must be a plain path"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL, e.g. `http://localhost:3001`
    pub url: String,
}

fn default_services() -> BTreeMap<String, ServiceConfig> {
    let mut services = BTreeMap::new();
    services.insert(
        PATIENT_SERVICE.to_string(),
        ServiceConfig {
            url: "http://localhost:3001".into(),
        },
    );
    services
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Path prefix matched on segment boundaries, e.g. `/api/patients`
    pub prefix: String,
    /// Key into `services`
    pub service: String,
    /// Label used in "The <label> service is currently unavailable."
    pub display_name: String,
    /// Replacement for `prefix` on the upstream side. Unset keeps the path as is.
    #[serde(default)]
    pub rewrite: Option<String>,
}

impl RouteConfig {
    fn identity(prefix: &str, display_name: &str) -> Self {
        Self {
            prefix: prefix.into(),
            service: PATIENT_SERVICE.into(),
            display_name: display_name.into(),
            rewrite: None,
        }
    }
}

fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::identity("/api/patients", "patient"),
        RouteConfig::identity("/api/appointments", "appointments"),
        RouteConfig::identity("/api/medications", "medications"),
        RouteConfig::identity("/api/medical-records", "medical records"),
        RouteConfig::identity("/api/auth", "authentication"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// How often expired windows are dropped from memory
    #[serde(default = "default_window_ms")]
    pub sweep_interval_ms: u64,
    /// Key clients by the left-most `X-Forwarded-For` entry instead of the
    /// socket address. Only safe behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_true() -> bool {
    true
}
fn default_max_requests() -> u32 {
    100
}
fn default_window_ms() -> u64 {
    60_000
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            sweep_interval_ms: default_window_ms(),
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Builds the configuration from the optional TOML file, `MEDGATE__*`
    /// variables and finally `PORT` / `PATIENT_SERVICE_URL`.
    ///
    /// `None` looks for `medgate.toml` in the working directory. An explicit
    /// path that does not exist is logged and skipped.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                } else {
                    tracing::warn!(
                        path = %p,
                        "Configuration file not found, using defaults and environment"
                    );
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("medgate.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., MEDGATE__RATE_LIMIT__MAX_REQUESTS=10
        builder = builder.add_source(
            Environment::with_prefix("MEDGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let mut merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.apply_legacy_env(|key| std::env::var(key).ok())?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.routes.len(), 5);
        assert_eq!(cfg.rate_limit.max_requests, 100);
        assert_eq!(cfg.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(cfg.health.probe_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.services[PATIENT_SERVICE].url, "http://localhost:3001");
    }

    #[test]
    fn test_legacy_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "8088"),
            ("PATIENT_SERVICE_URL", "http://patients.internal:9000"),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        cfg.apply_legacy_env(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(cfg.server.port, 8088);
        assert_eq!(
            cfg.services[PATIENT_SERVICE].url,
            "http://patients.internal:9000"
        );
    }

    #[test]
    fn test_legacy_env_rejects_bad_port() {
        let mut cfg = AppConfig::default();
        let err = cfg
            .apply_legacy_env(|k| (k == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.contains("PORT"));
    }

    #[test]
    fn test_unknown_service_rejected() {
        let mut cfg = AppConfig::default();
        cfg.routes[0].service = "billing-service".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("unknown service 'billing-service'"));
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let mut cfg = AppConfig::default();
        let dup = cfg.routes[0].clone();
        cfg.routes.push(dup);
        assert!(cfg.validate().unwrap_err().contains("duplicate route prefix"));
    }

    #[test]
    fn test_prefix_shape_rejected() {
        let mut cfg = AppConfig::default();
        cfg.routes[0].prefix = "api/patients".into();
        assert!(cfg.validate().unwrap_err().contains("must start with '/'"));

        let mut cfg = AppConfig::default();
        cfg.routes[0].prefix = "/api/patients/".into();
        assert!(cfg.validate().unwrap_err().contains("must not end with '/'"));
    }

    #[test]
    fn test_service_url_must_be_http() {
        let mut cfg = AppConfig::default();
        cfg.services.get_mut(PATIENT_SERVICE).unwrap().url = "ftp://files.local".into();
        assert!(cfg.validate().unwrap_err().contains("http or https"));

        cfg.services.get_mut(PATIENT_SERVICE).unwrap().url = "not a url".into();
        assert!(cfg.validate().unwrap_err().contains("is invalid"));
    }

    #[test]
    fn test_missing_explicit_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let cfg = loader::load_config(missing.to_str()).unwrap();
        assert_eq!(cfg.routes.len(), 5);
        assert_eq!(cfg.rate_limit.window_ms, 60_000);
    }

    #[test]
    fn test_hostname_rejected_instead_of_widened() {
        let mut cfg = AppConfig::default();
        cfg.server.host = "localhost".into();
        assert!(cfg.validate().unwrap_err().contains("server.host 'localhost'"));
        assert!(cfg.addr().is_err());

        cfg.server.host = "127.0.0.1".into();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.addr().unwrap(), "127.0.0.1:3000".parse().unwrap());

        cfg.server.host = "::1".into();
        assert_eq!(cfg.addr().unwrap(), "[::1]:3000".parse().unwrap());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut cfg = AppConfig::default();
        cfg.rate_limit.max_requests = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.health.probe_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
