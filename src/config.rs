//! Runtime configuration for the proxy.
//!
//! Everything the fetcher, style resolver and rewriter need is carried
//! explicitly in [`ProxyConfig`]; nothing is read from the environment
//! after startup.

use std::net::SocketAddr;
use std::time::Duration;

/// Identity string sent with every upstream request.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) ",
    "AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
);

/// Preset used when a request names no theme.
pub const DEFAULT_PRESET: &str = "pixel";

/// 5 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// 32 MiB; ad-hoc stylesheets ride in the POST body
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 32 * 1024 * 1024;

/// Webfonts the bundled presets rely on.
pub const DEFAULT_FONT_STYLESHEETS: &[&str] = &[concat!(
    "https://fonts.googleapis.com/css2?family=Press+Start+2P&family=Share+Tech+Mono",
    "&family=Inter:wght@300;400;700&family=VT323&family=Silkscreen",
    "&family=Outfit:wght@300;400;700&display=swap"
)];

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Listen address for the HTTP server
    pub bind: SocketAddr,
    /// Route serving both proxy entry points; rewritten links point back here
    pub proxy_path: String,
    /// Prefix under which preset stylesheets are served
    pub themes_path: String,
    pub default_preset: String,
    pub user_agent: String,
    /// End-to-end budget for one upstream fetch, body included
    pub fetch_timeout: Duration,
    pub max_body_bytes: usize,
    /// Largest incoming POST body
    pub max_request_bytes: usize,
    pub max_redirects: usize,
    /// Injected into `<head>` ahead of the theme
    pub font_stylesheets: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            proxy_path: "/proxy".to_string(),
            themes_path: "/themes".to_string(),
            default_preset: DEFAULT_PRESET.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout: Duration::from_secs(10),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_redirects: 5,
            font_stylesheets: DEFAULT_FONT_STYLESHEETS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ProxyConfig {
    pub fn with_proxy_path(mut self, path: impl Into<String>) -> Self {
        self.proxy_path = normalize_route(path.into());
        self
    }

    pub fn with_themes_path(mut self, path: impl Into<String>) -> Self {
        let path = normalize_route(path.into());
        self.themes_path = path.trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_preset(mut self, preset: impl Into<String>) -> Self {
        let preset = preset.into();
        if !preset.trim().is_empty() {
            self.default_preset = preset.trim().to_string();
        }
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }
}

/// Route paths must be absolute.
fn normalize_route(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_limits() {
        let config = ProxyConfig::default();
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.max_body_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_request_bytes, 32 * 1024 * 1024);
        assert_eq!(config.default_preset, "pixel");
        assert_eq!(config.proxy_path, "/proxy");
        assert_eq!(config.font_stylesheets.len(), 1);
    }

    #[test]
    fn builder_normalizes_paths() {
        let config = ProxyConfig::default()
            .with_proxy_path("api/proxy")
            .with_themes_path("/static/themes/");
        assert_eq!(config.proxy_path, "/api/proxy");
        assert_eq!(config.themes_path, "/static/themes");
    }

    #[test]
    fn blank_default_preset_is_ignored() {
        let config = ProxyConfig::default().with_default_preset("  ");
        assert_eq!(config.default_preset, "pixel");
    }
}
