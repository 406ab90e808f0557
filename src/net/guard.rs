//! SSRF guard for upstream targets.
//!
//! Only literal host checks are performed. A public hostname that resolves
//! to a private address (DNS rebinding) and IPv6 unique-local / link-local
//! literals are NOT caught here.

use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

/// An absolute http(s) URL whose host passed the guard.
///
/// Only [`validate`] and [`validate_url`] construct this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl(Url);

impl ResolvedUrl {
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Bypasses the guard so fetcher tests can reach a loopback upstream.
    #[cfg(test)]
    pub(crate) fn unchecked(raw: &str) -> Self {
        Self(Url::parse(raw).unwrap())
    }
}

impl std::fmt::Display for ResolvedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a target was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    Unparseable(String),
    Scheme(String),
    MissingHost,
    RestrictedHost(String),
}

impl std::fmt::Display for GuardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardError::Unparseable(e) => write!(f, "not an absolute URL: {}", e),
            GuardError::Scheme(s) => write!(f, "scheme not allowed: {}", s),
            GuardError::MissingHost => write!(f, "URL has no host"),
            GuardError::RestrictedHost(h) => write!(f, "host is restricted: {}", h),
        }
    }
}

impl std::error::Error for GuardError {}

/// Parse `raw` and check it is a fetchable public target.
pub fn validate(raw: &str) -> Result<ResolvedUrl, GuardError> {
    let url = Url::parse(raw.trim()).map_err(|e| GuardError::Unparseable(e.to_string()))?;
    validate_url(&url)
}

/// Guard an already-parsed URL (used again for every redirect hop).
pub fn validate_url(url: &Url) -> Result<ResolvedUrl, GuardError> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(GuardError::Scheme(other.to_string())),
    }

    let host = url.host().ok_or(GuardError::MissingHost)?;
    let restricted = match &host {
        Host::Domain(name) => is_restricted_name(name),
        Host::Ipv4(ip) => is_restricted_v4(*ip),
        Host::Ipv6(ip) => is_restricted_v6(*ip),
    };
    if restricted {
        return Err(GuardError::RestrictedHost(host.to_string()));
    }

    Ok(ResolvedUrl(url.clone()))
}

fn is_restricted_name(name: &str) -> bool {
    // `Url` lowercases domains for special schemes
    name == "localhost" || name == "localhost."
}

fn is_restricted_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || a == 10
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
}

fn is_restricted_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() {
        return true;
    }
    match ip.to_ipv4_mapped() {
        Some(v4) => is_restricted_v4(v4),
        None => false,
    }
}
