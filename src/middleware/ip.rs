//! Client address extraction shared by the rate-limit, audit and logging stages.
//!
//! # Trust Model
//!
//! The client address is the socket peer from `ConnectInfo<SocketAddr>`.
//! Proxy headers are honoured only when that peer falls inside one of the
//! configured [`TrustedProxies`] ranges (`TRUSTED_PROXIES`). With no ranges
//! configured, `X-Forwarded-For` and `X-Real-IP` are ignored, so a client
//! cannot rotate them to obtain fresh rate-limit buckets.
//!
//! # Header Priority (trusted peer only)
//!
//! 1. `X-Forwarded-For` (first address in the list)
//! 2. `X-Real-IP`
//! 3. The peer itself
//!
//! Requests without a known peer share the [`UNKNOWN_IP`] bucket.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::http::header::USER_AGENT;
use tracing::{debug, warn};

/// Fallback value when no client address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse `10.0.0.0/8`, `::1/128` or a bare address (full-length prefix).
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().ok()?,
            None => max_prefix,
        };

        if prefix_len > max_prefix {
            return None;
        }

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Whether `ip` lies inside this range. Address families never match each other.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

/// Reverse proxies whose forwarding headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    ranges: Vec<CidrRange>,
}

impl TrustedProxies {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy ranges configured");
        }

        Self { ranges }
    }

    /// Whether any range is configured.
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether `ip` belongs to a trusted proxy. Always false with no ranges.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }
}

// =============================================================================
// Extraction
// =============================================================================

fn forwarded_ip<B>(req: &Request<B>) -> Option<&str> {
    // Format: "client, proxy1, proxy2" - we want the first (client) IP
    let from_xff = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    from_xff.or_else(|| {
        req.headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    })
}

/// Extract the client IP used as the rate-limit identifier.
///
/// Returns `Cow::Borrowed(UNKNOWN_IP)` when the peer is unknown, so the
/// fallback does not allocate.
pub fn extract_client_ip<B>(req: &Request<B>, proxies: &TrustedProxies) -> Cow<'static, str> {
    let Some(peer) = peer_addr(req) else {
        return Cow::Borrowed(UNKNOWN_IP);
    };

    if proxies.is_trusted(&peer.ip())
        && let Some(ip) = forwarded_ip(req)
    {
        return Cow::Owned(ip.to_string());
    }

    Cow::Owned(peer.ip().to_string())
}

/// Remote address for log records: the socket peer as `ip:port`.
pub fn remote_addr<B>(req: &Request<B>) -> String {
    match peer_addr(req) {
        Some(addr) => addr.to_string(),
        None => UNKNOWN_IP.to_string(),
    }
}

/// `User-Agent` header, or an empty string.
pub fn user_agent<B>(req: &Request<B>) -> String {
    req.headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}
