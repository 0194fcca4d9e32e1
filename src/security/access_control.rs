//! IP-based access control.
//!
//! # Responsibilities
//! - Parse allow/block entries into CIDR ranges at startup
//! - Answer allow/block queries for a client address
//! - Extract the client address from proxy headers or the peer socket
//!
//! # Design Decisions
//! - IPv4 ranges are stored as IPv4-mapped IPv6 so one membership test
//!   covers both families
//! - Blocklist always wins over the allowlist
//! - Empty allowlist = block-only mode (allow all not blocked)

use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use axum::http::HeaderMap;
use thiserror::Error;

use crate::config::SecurityPolicy;

/// Header commonly set by a fronting load balancer with the client's address.
pub const X_REAL_IP: &str = "x-real-ip";
/// Standard forwarding chain; only the first hop is used.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Errors produced while parsing a CIDR entry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CidrParseError {
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("invalid prefix length {prefix:?} (max {max})")]
    InvalidPrefix { prefix: String, max: u8 },
}

/// A parsed network prefix.
///
/// Stored in the IPv6 space; IPv4 networks become `::ffff:a.b.c.d/(96 + n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrRange {
    network: u128,
    prefix: u8,
    v4: bool,
}

impl CidrRange {
    /// Build a range, masking off host bits.
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, CidrParseError> {
        let (bits, prefix, v4) = match addr {
            IpAddr::V4(v4) => {
                if prefix_len > 32 {
                    return Err(CidrParseError::InvalidPrefix {
                        prefix: prefix_len.to_string(),
                        max: 32,
                    });
                }
                (u128::from(v4.to_ipv6_mapped()), prefix_len + 96, true)
            }
            IpAddr::V6(v6) => {
                if prefix_len > 128 {
                    return Err(CidrParseError::InvalidPrefix {
                        prefix: prefix_len.to_string(),
                        max: 128,
                    });
                }
                (u128::from(v6), prefix_len, false)
            }
        };

        Ok(Self {
            network: bits & mask(prefix),
            prefix,
            v4,
        })
    }

    /// Host-only range (/32 or /128) for a single address.
    pub fn host(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self {
                network: u128::from(v4.to_ipv6_mapped()),
                prefix: 128,
                v4: true,
            },
            IpAddr::V6(v6) => Self {
                network: u128::from(v6),
                prefix: 128,
                v4: false,
            },
        }
    }

    /// Whether `addr` falls inside this range.
    pub fn contains(&self, addr: IpAddr) -> bool {
        (normalize(addr) & mask(self.prefix)) == self.network
    }

    /// Prefix length in the range's own family.
    pub fn prefix_len(&self) -> u8 {
        if self.v4 {
            self.prefix - 96
        } else {
            self.prefix
        }
    }
}

impl FromStr for CidrRange {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let ip: IpAddr = addr
                    .parse()
                    .map_err(|_| CidrParseError::InvalidAddress(addr.to_string()))?;
                let max = if ip.is_ipv4() { 32 } else { 128 };
                let prefix_len: u8 = prefix.parse().map_err(|_| CidrParseError::InvalidPrefix {
                    prefix: prefix.to_string(),
                    max,
                })?;
                Self::new(ip, prefix_len)
            }
            None => s
                .parse::<IpAddr>()
                .map(Self::host)
                .map_err(|_| CidrParseError::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for CidrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v6 = Ipv6Addr::from(self.network);
        match (self.v4, v6.to_ipv4_mapped()) {
            (true, Some(v4)) => write!(f, "{}/{}", v4, self.prefix_len()),
            _ => write!(f, "{}/{}", v6, self.prefix),
        }
    }
}

fn mask(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

fn normalize(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(v4.to_ipv6_mapped()),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Outcome of an access check, kept distinct for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    /// Matched a blocklist range.
    Blocked,
    /// An allowlist is active and the address is not on it (or is unknown).
    NotAllowlisted,
}

impl AccessDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessDecision::Allowed => "allowed",
            AccessDecision::Blocked => "blocklisted",
            AccessDecision::NotAllowlisted => "not_allowlisted",
        }
    }
}

/// Allow/block list enforcement over parsed CIDR tables.
#[derive(Debug, Clone, Default)]
pub struct IpAccessController {
    enabled: bool,
    allow: Vec<CidrRange>,
    block: Vec<CidrRange>,
}

impl IpAccessController {
    pub fn new(enabled: bool, allow: Vec<CidrRange>, block: Vec<CidrRange>) -> Self {
        Self {
            enabled,
            allow,
            block,
        }
    }

    /// Parse the policy's lists. Any malformed entry is an error.
    pub fn from_policy(policy: &SecurityPolicy) -> Result<Self, CidrParseError> {
        let allow = parse_all(&policy.ip_allowlist)?;
        let block = parse_all(&policy.ip_blocklist)?;

        tracing::debug!(
            enabled = policy.ip_control_enabled,
            allow_ranges = allow.len(),
            block_ranges = block.len(),
            "IP access control initialized"
        );

        Ok(Self::new(policy.ip_control_enabled, allow, block))
    }

    pub fn is_blocked(&self, addr: IpAddr) -> bool {
        self.enabled && self.block.iter().any(|r| r.contains(addr))
    }

    pub fn is_allowed(&self, addr: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }
        if self.is_blocked(addr) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|r| r.contains(addr))
    }

    /// Decide for a possibly-unparsable client address.
    pub fn check(&self, addr: Option<IpAddr>) -> AccessDecision {
        if !self.enabled {
            return AccessDecision::Allowed;
        }
        match addr {
            Some(ip) if self.is_blocked(ip) => AccessDecision::Blocked,
            Some(ip) if self.is_allowed(ip) => AccessDecision::Allowed,
            Some(_) => AccessDecision::NotAllowlisted,
            None if self.allow.is_empty() => AccessDecision::Allowed,
            None => AccessDecision::NotAllowlisted,
        }
    }
}

fn parse_all(entries: &[String]) -> Result<Vec<CidrRange>, CidrParseError> {
    entries.iter().map(|e| e.parse()).collect()
}

/// The client address as seen by the gateway.
///
/// `raw` is kept for logging; `ip` is only ever used for membership tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress {
    pub raw: String,
    pub ip: Option<IpAddr>,
}

impl ClientAddress {
    pub fn unknown() -> Self {
        Self {
            raw: "unknown".to_string(),
            ip: None,
        }
    }
}

impl fmt::Display for ClientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            Some(ip) => write!(f, "{}", ip),
            None => f.write_str(&self.raw),
        }
    }
}

/// Resolve the client address.
///
/// Order: trusted proxy header, `X-Real-IP`, first hop of `X-Forwarded-For`,
/// then the transport peer with its port stripped. The first header that is
/// present wins even if it does not parse.
pub fn extract_client_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_header: Option<&str>,
) -> ClientAddress {
    let candidates = trusted_header
        .into_iter()
        .chain([X_REAL_IP, X_FORWARDED_FOR]);

    for name in candidates {
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let first_hop = value.split(',').next().unwrap_or_default().trim();
        if first_hop.is_empty() {
            continue;
        }
        return ClientAddress {
            raw: first_hop.to_string(),
            ip: parse_ip(first_hop),
        };
    }

    match peer {
        Some(addr) => ClientAddress {
            raw: addr.ip().to_string(),
            ip: Some(addr.ip()),
        },
        None => ClientAddress::unknown(),
    }
}

/// Parse an address that may carry a port (`1.2.3.4:80`, `[::1]:443`).
fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|s| s.ip()))
}
