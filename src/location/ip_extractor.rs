//! Client IP extraction for the redirect surface
//!
//! Proxy headers are only honoured when the deployment says a proxy is
//! in front of us; otherwise the socket address wins.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Trust only the socket peer address
    #[default]
    None,
    /// Trust `Forwarded` / `X-Forwarded-For` from our own proxies
    Standard,
    /// Trust `CF-Connecting-IP`
    Cloudflare,
}

/// Pick the address to locate for a request.
///
/// `trusted_hops` is the number of proxies we run in front of the service;
/// that many entries are skipped from the right of `X-Forwarded-For`.
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    mode: TrustedProxyMode,
    trusted_hops: usize,
) -> IpAddr {
    match mode {
        TrustedProxyMode::Cloudflare => header_ip(headers, "cf-connecting-ip").unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => from_forwarded(headers)
            .or_else(|| from_x_forwarded_for(headers, trusted_hops))
            .unwrap_or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// First `for=` of an RFC 7239 `Forwarded` header
fn from_forwarded(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    forwarded
        .split(',')
        .flat_map(|element| element.split(';'))
        .filter_map(|param| {
            let value = param.trim();
            let value = value
                .strip_prefix("for=")
                .or_else(|| value.strip_prefix("For="))?;
            parse_node(value.trim_matches('"'))
        })
        .next()
}

/// Node forms: `1.2.3.4`, `1.2.3.4:80`, `[2001:db8::1]`, `[2001:db8::1]:80`
fn parse_node(node: &str) -> Option<IpAddr> {
    if let Some(rest) = node.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    node.parse()
        .ok()
        .or_else(|| node.split(':').next()?.parse().ok())
}

fn from_x_forwarded_for(headers: &HeaderMap, trusted_hops: usize) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let ips: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    if ips.len() > trusted_hops {
        Some(ips[ips.len() - trusted_hops - 1])
    } else {
        // Not enough hops in the chain, return the leftmost
        ips.first().copied()
    }
}
