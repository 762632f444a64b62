//! Bypass - address exclusion policy
//!
//! A bypass answers one question: should traffic to this address skip the
//! node (or hop) it is attached to? Matching is a pure function of the
//! address, no IO.

use std::net::IpAddr;

use ipnet::IpNet;
use regex::Regex;
use tracing::warn;

use crate::common::split_host_port;

/// Address filter attached to nodes and hops.
pub trait Bypass: Send + Sync {
    /// Reports whether the bypass includes `addr` (`host`, `host:port` or
    /// `[v6]:port`).
    fn contains(&self, addr: &str) -> bool;
}

/// A single compiled pattern
#[derive(Debug, Clone)]
enum Matcher {
    Ip(IpAddr),
    Cidr(IpNet),
    /// `domain:example.com` or `.example.com`: the domain and its subdomains
    Domain(String),
    /// `full:example.com` or a plain host: exact match
    Full(String),
    /// `*.example.com`: subdomains only
    Wildcard(String),
    Keyword(String),
    Regexp(Regex),
}

impl Matcher {
    fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return None;
        }

        if let Some(target) = pattern.strip_prefix("domain:") {
            return Some(Matcher::Domain(target.to_lowercase()));
        }
        if let Some(target) = pattern.strip_prefix("full:") {
            return Some(Matcher::Full(target.to_lowercase()));
        }
        if let Some(keyword) = pattern.strip_prefix("keyword:") {
            return Some(Matcher::Keyword(keyword.to_lowercase()));
        }
        if let Some(expr) = pattern.strip_prefix("regexp:") {
            return match Regex::new(expr) {
                Ok(re) => Some(Matcher::Regexp(re)),
                Err(e) => {
                    warn!("bypass: invalid regexp {}: {}", expr, e);
                    None
                }
            };
        }
        if let Some(suffix) = pattern.strip_prefix("*.") {
            return Some(Matcher::Wildcard(suffix.to_lowercase()));
        }
        if let Some(suffix) = pattern.strip_prefix('.') {
            return Some(Matcher::Domain(suffix.to_lowercase()));
        }
        if pattern.contains('/') {
            return match pattern.parse::<IpNet>() {
                Ok(net) => Some(Matcher::Cidr(net)),
                Err(_) => {
                    warn!("bypass: invalid CIDR {}", pattern);
                    None
                }
            };
        }
        if let Ok(ip) = pattern.parse::<IpAddr>() {
            return Some(Matcher::Ip(ip));
        }
        Some(Matcher::Full(pattern.to_lowercase()))
    }

    fn matches(&self, host: &str, ip: Option<IpAddr>) -> bool {
        match self {
            Matcher::Ip(target) => ip == Some(*target),
            Matcher::Cidr(net) => ip.map(|ip| net.contains(&ip)).unwrap_or(false),
            Matcher::Domain(target) => {
                host == target || host.ends_with(&format!(".{}", target))
            }
            Matcher::Full(target) => host == target,
            Matcher::Wildcard(suffix) => host.ends_with(&format!(".{}", suffix)),
            Matcher::Keyword(keyword) => host.contains(keyword.as_str()),
            Matcher::Regexp(re) => re.is_match(host),
        }
    }
}

/// Pattern-list bypass
///
/// Supported patterns:
/// - `1.2.3.4`, `::1`: exact IP
/// - `10.0.0.0/8`: CIDR
/// - `domain:example.com`, `.example.com`: domain and subdomains
/// - `*.example.com`: subdomains only
/// - `full:example.com`, `example.com`: exact host
/// - `keyword:ads`, `regexp:^cdn[0-9]+\.`: substring / regular expression
///
/// In whitelist mode the result is inverted: everything *not* matched is
/// bypassed.
#[derive(Debug, Clone, Default)]
pub struct AddrBypass {
    matchers: Vec<Matcher>,
    whitelist: bool,
}

impl AddrBypass {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            matchers: patterns
                .into_iter()
                .filter_map(|p| Matcher::parse(p.as_ref()))
                .collect(),
            whitelist: false,
        }
    }

    /// Builder: invert the match result
    pub fn whitelist(mut self, whitelist: bool) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    fn matches(&self, addr: &str) -> bool {
        let host = match split_host_port(addr) {
            Some((host, _)) => host,
            None => addr.trim_start_matches('[').trim_end_matches(']'),
        };
        let host = host.to_lowercase();
        let ip = host.parse::<IpAddr>().ok();
        self.matchers.iter().any(|m| m.matches(&host, ip))
    }
}

impl Bypass for AddrBypass {
    fn contains(&self, addr: &str) -> bool {
        if addr.is_empty() {
            return false;
        }
        self.matches(addr) != self.whitelist
    }
}
