//! Pre-navigation URL guard. Every navigation-causing action goes through
//! [`SsrfGuard::check`] first; there is no fallback URL on rejection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use runflow_core_types::EngineError;

/// Guard configuration.
#[derive(Clone, Debug)]
pub struct GuardConfig {
    /// Bound on DNS resolution; exceeded means the URL is rejected.
    pub dns_timeout: Duration,
    /// When set, only these hostnames (case-insensitive) are allowed. Checked
    /// before DNS is consulted.
    pub allowed_hosts: Option<Vec<String>>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            dns_timeout: Duration::from_millis(1500),
            allowed_hosts: None,
        }
    }
}

/// Rejection causes. All of them fold into `ErrorKind::SsrfBlocked`.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GuardError {
    #[error("scheme '{0}' is not allowed, only http/https")]
    Scheme(String),

    #[error("url has no host")]
    MissingHost,

    #[error("url failed to parse: {0}")]
    Malformed(String),

    #[error("host '{0}' is not on the allowlist")]
    HostNotAllowed(String),

    #[error("dns resolution failed for '{0}': {1}")]
    ResolveFailed(String, String),

    #[error("dns resolution for '{0}' timed out")]
    ResolveTimeout(String),

    #[error("host '{host}' resolves to blocked address {ip}")]
    BlockedAddress { host: String, ip: IpAddr },
}

impl From<GuardError> for EngineError {
    fn from(err: GuardError) -> Self {
        EngineError::ssrf_blocked(err.to_string())
    }
}

/// Validates candidate navigation URLs: scheme, optional allowlist, bounded
/// DNS resolution, and address-range checks on every resolved address.
#[derive(Clone, Debug, Default)]
pub struct SsrfGuard {
    cfg: GuardConfig,
}

impl SsrfGuard {
    pub fn new(cfg: GuardConfig) -> Self {
        Self { cfg }
    }

    /// Check one candidate URL. Returns the parsed URL on success so callers
    /// navigate to exactly what was vetted.
    pub async fn check(&self, raw: &str) -> Result<Url, GuardError> {
        let url = Url::parse(raw.trim()).map_err(|e| GuardError::Malformed(e.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(GuardError::Scheme(other.to_string())),
        }

        let host = url.host_str().ok_or(GuardError::MissingHost)?.to_string();

        if let Some(allowed) = &self.cfg.allowed_hosts {
            if !allowed.iter().any(|h| h.eq_ignore_ascii_case(&host)) {
                return Err(GuardError::HostNotAllowed(host));
            }
        }

        let port = url.port_or_known_default().unwrap_or(80);
        let addrs = self.resolve(&host, port).await?;
        for addr in &addrs {
            if ip_is_forbidden(addr.ip()) {
                warn!(host = %host, ip = %addr.ip(), "navigation target blocked");
                return Err(GuardError::BlockedAddress {
                    host,
                    ip: addr.ip(),
                });
            }
        }

        debug!(host = %host, addrs = addrs.len(), "navigation target vetted");
        Ok(url)
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, GuardError> {
        // Literal IPs skip DNS but not the range checks.
        if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        let lookup = tokio::net::lookup_host((host, port));
        match tokio::time::timeout(self.cfg.dns_timeout, lookup).await {
            Ok(Ok(addrs)) => {
                let addrs: Vec<SocketAddr> = addrs.collect();
                if addrs.is_empty() {
                    Err(GuardError::ResolveFailed(
                        host.to_string(),
                        "no addresses".into(),
                    ))
                } else {
                    Ok(addrs)
                }
            }
            Ok(Err(err)) => Err(GuardError::ResolveFailed(host.to_string(), err.to_string())),
            Err(_) => Err(GuardError::ResolveTimeout(host.to_string())),
        }
    }
}

/// True when the address must never be a navigation target: loopback,
/// link-local, RFC 1918 private, unique-local, or unspecified.
pub fn ip_is_forbidden(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4_is_forbidden(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = to_ipv4_mapped(&v6) {
                return v4_is_forbidden(mapped);
            }
            v6.is_loopback()
                || v6.is_unspecified()
                // fe80::/10 link-local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                // fc00::/7 unique-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

fn v4_is_forbidden(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
}

fn to_ipv4_mapped(v6: &Ipv6Addr) -> Option<Ipv4Addr> {
    let seg = v6.segments();
    if seg[..5] == [0, 0, 0, 0, 0] && seg[5] == 0xffff {
        let [a, b] = seg[6].to_be_bytes();
        let [c, d] = seg[7].to_be_bytes();
        Some(Ipv4Addr::new(a, b, c, d))
    } else {
        None
    }
}
