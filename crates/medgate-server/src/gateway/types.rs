//! Proxy route definitions.

use url::Url;

/// One entry of the proxy table: requests under `prefix` go to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    /// Path prefix, matched on segment boundaries.
    pub prefix: String,

    /// Name of the backend service (key of the `services` table).
    pub service: String,

    /// Human label used in unavailability messages, e.g. "patient".
    pub display_name: String,

    /// Base URL of the backend.
    pub target: Url,

    /// Upstream replacement for `prefix`. `None` keeps the path unchanged.
    pub rewrite: Option<String>,
}

impl RouteRule {
    /// True when `path` equals the prefix or continues it with a `/`.
    ///
    /// `/api/patients` matches `/api/patients` and `/api/patients/42`, but not
    /// `/api/patients-archive`.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Maps a matching request path onto the upstream path.
    pub fn rewrite_path(&self, path: &str) -> String {
        let Some(replacement) = self.rewrite.as_deref() else {
            return path.to_string();
        };
        let remainder = if self.prefix == "/" {
            if path == "/" { "" } else { path }
        } else {
            path.strip_prefix(self.prefix.as_str()).unwrap_or(path)
        };

        match (replacement, remainder) {
            ("/", "") => "/".to_string(),
            ("/", rest) => rest.to_string(),
            (base, rest) => format!("{base}{rest}"),
        }
    }

    /// Full upstream URL for a request path and optional query string.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
        let base = self.target.as_str().trim_end_matches('/');
        let mut joined = format!("{base}{}", self.rewrite_path(path));
        if let Some(q) = query {
            joined.push('?');
            joined.push_str(q);
        }
        Url::parse(&joined)
    }
}
