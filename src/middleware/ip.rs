//! Caller IP resolution for audit records.
//!
//! # Resolution Order
//!
//! 1. `X-Forwarded-For` (first hop of a comma-separated list)
//! 2. `X-Real-IP`
//! 3. Socket peer address from axum's `ConnectInfo` extension
//! 4. [`UNKNOWN_IP`]
//!
//! # Trusted Proxies
//!
//! Forwarding headers are client controlled. When `TRUSTED_PROXIES` lists CIDR
//! ranges and the socket peer is known, the headers are honoured only if the
//! peer falls inside one of those ranges; otherwise the peer address itself is
//! recorded. Without configured ranges every source is trusted.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Recorded when no caller address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Where the resolved address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderIp<'a> {
    FromXff(&'a str),
    FromRealIp(&'a str),
    NotFound,
}

#[inline]
fn ip_from_headers<B>(req: &Request<B>) -> HeaderIp<'_> {
    // "client, proxy1, proxy2": the first entry is the originating client
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').next()
        && !first_ip.trim().is_empty()
    {
        return HeaderIp::FromXff(first_ip.trim());
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return HeaderIp::FromRealIp(value.trim());
    }

    HeaderIp::NotFound
}

#[inline]
fn peer_addr<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

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
    /// Parse `10.0.0.0/8`, `::1/128`, or a bare address (implicit full prefix).
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, prefix) = match cidr.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr.trim(), None),
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

    /// Check if `ip` falls inside this range. Address families never mix.
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

/// Set of proxy networks whose forwarding headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
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

        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// `true` if `ip` is inside a configured range, or no ranges are configured.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(ip))
    }
}

/// Resolve the caller address of a request.
///
/// Returns `Cow::Borrowed(UNKNOWN_IP)` when nothing identifies the caller.
pub fn resolve_client_ip<B>(req: &Request<B>, trusted: &TrustedProxyConfig) -> Cow<'static, str> {
    let peer = peer_addr(req);

    if let Some(peer) = peer
        && !trusted.is_trusted(&peer)
    {
        if !matches!(ip_from_headers(req), HeaderIp::NotFound) {
            debug!(peer = %peer, "Ignoring forwarding headers from untrusted peer");
        }
        return Cow::Owned(peer.to_string());
    }

    match ip_from_headers(req) {
        HeaderIp::FromXff(ip) | HeaderIp::FromRealIp(ip) => Cow::Owned(ip.to_string()),
        HeaderIp::NotFound => match peer {
            Some(peer) => Cow::Owned(peer.to_string()),
            None => Cow::Borrowed(UNKNOWN_IP),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn with_peer(mut req: Request<Body>, peer: &str) -> Request<Body> {
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn test_xff_first_hop_wins() {
        let req = Request::builder()
            .header("x-forwarded-for", "  192.168.1.1  , 10.0.0.1")
            .header("x-real-ip", "172.16.0.9")
            .body(Body::empty())
            .unwrap();

        let ip = resolve_client_ip(&req, &TrustedProxyConfig::default());
        assert_eq!(ip, "192.168.1.1");
    }

    #[test]
    fn test_real_ip_used_without_xff() {
        let req = Request::builder()
            .header("x-real-ip", "::1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(resolve_client_ip(&req, &TrustedProxyConfig::default()), "::1");
    }

    #[test]
    fn test_blank_xff_falls_through() {
        let req = Request::builder()
            .header("x-forwarded-for", "   ")
            .header("x-real-ip", "10.1.1.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(
            resolve_client_ip(&req, &TrustedProxyConfig::default()),
            "10.1.1.1"
        );
    }

    #[test]
    fn test_connect_info_fallback() {
        let req = with_peer(Request::builder().body(Body::empty()).unwrap(), "10.9.8.7:5555");

        assert_eq!(
            resolve_client_ip(&req, &TrustedProxyConfig::default()),
            "10.9.8.7"
        );
    }

    #[test]
    fn test_unknown_is_borrowed() {
        let req = Request::builder().body(Body::empty()).unwrap();

        let ip = resolve_client_ip(&req, &TrustedProxyConfig::default());
        assert_eq!(ip, UNKNOWN_IP);
        assert!(matches!(ip, Cow::Borrowed(_)));
    }

    #[test]
    fn test_untrusted_peer_headers_ignored() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = with_peer(
            Request::builder()
                .header("x-forwarded-for", "1.2.3.4")
                .body(Body::empty())
                .unwrap(),
            "203.0.113.7:40000",
        );

        assert_eq!(resolve_client_ip(&req, &trusted), "203.0.113.7");
    }

    #[test]
    fn test_trusted_peer_headers_honoured() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = with_peer(
            Request::builder()
                .header("x-forwarded-for", "1.2.3.4")
                .body(Body::empty())
                .unwrap(),
            "10.0.0.2:40000",
        );

        assert_eq!(resolve_client_ip(&req, &trusted), "1.2.3.4");
    }

    #[test]
    fn test_cidr_parse() {
        assert!(CidrRange::parse("10.0.0.0/8").is_some());
        assert!(CidrRange::parse("::1/128").is_some());
        assert!(CidrRange::parse("192.168.1.1").is_some());
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = CidrRange::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!cidr.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));

        let all = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(all.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_trusted_proxy_config_empty_trusts_all() {
        let config = TrustedProxyConfig::new(&[]);
        assert!(!config.is_enabled());
        assert!(config.is_trusted(&"1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn test_trusted_proxy_config_skips_invalid() {
        let config = TrustedProxyConfig::new(&["bogus".to_string(), "172.16.0.0/12".to_string()]);
        assert!(config.is_enabled());
        assert!(config.is_trusted(&"172.31.255.255".parse().unwrap()));
        assert!(!config.is_trusted(&"8.8.8.8".parse().unwrap()));
    }
}
