//! Client address resolution
//!
//! Forwarding headers are only honoured when the socket peer is a configured
//! trusted proxy. Any other peer is identified by its socket address, so a
//! client cannot pick its own rate limit key by sending `X-Forwarded-For`.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, request::Parts};

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Proxies allowed to report the client address, installed as a router
/// `Extension`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    proxies: Vec<IpAddr>,
}

impl TrustedProxies {
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self { proxies }
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.proxies.contains(&ip)
    }

    /// Resolve the caller's address from the socket peer and, when the peer
    /// is trusted, its forwarding headers
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
        let peer = peer?;
        if !self.is_trusted(peer) {
            return Some(peer);
        }

        // Walk X-Forwarded-For from the right, skipping our own proxies
        let forwarded = headers
            .get_all(FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .collect::<Vec<_>>();
        for hop in forwarded.iter().rev() {
            match hop.parse::<IpAddr>() {
                Ok(ip) if self.is_trusted(ip) => continue,
                Ok(ip) => return Some(ip),
                Err(_) => {
                    tracing::debug!(hop = %hop, "Unparseable X-Forwarded-For hop");
                    return Some(peer);
                }
            }
        }

        let real_ip = headers
            .get(REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        Some(real_ip.unwrap_or(peer))
    }

    /// Resolve from request parts; without a `TrustedProxies` extension no
    /// header is trusted
    pub fn resolve_parts(parts: &Parts) -> Option<IpAddr> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        match parts.extensions.get::<TrustedProxies>() {
            Some(trusted) => trusted.resolve(&parts.headers, peer),
            None => peer,
        }
    }
}
