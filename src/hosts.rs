//! Static host mapping

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;

/// Maps host names to IP addresses ahead of any resolver.
#[async_trait]
pub trait HostMapper: Send + Sync {
    /// `network` is "ip", "ip4" or "ip6". Returns `None` on a miss.
    async fn lookup(&self, network: &str, host: &str) -> Option<Vec<IpAddr>>;
}

/// In-memory host table
#[derive(Debug, Clone, Default)]
pub struct StaticHosts {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticHosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a mapping
    pub fn with_entry(mut self, host: impl AsRef<str>, ips: Vec<IpAddr>) -> Self {
        self.insert(host, ips);
        self
    }

    pub fn insert(&mut self, host: impl AsRef<str>, ips: Vec<IpAddr>) {
        self.entries
            .entry(host.as_ref().to_lowercase())
            .or_default()
            .extend(ips);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl HostMapper for StaticHosts {
    async fn lookup(&self, network: &str, host: &str) -> Option<Vec<IpAddr>> {
        let ips = self.entries.get(&host.to_lowercase())?;
        let ips: Vec<IpAddr> = ips
            .iter()
            .copied()
            .filter(|ip| match network {
                "ip4" => ip.is_ipv4(),
                "ip6" => ip.is_ipv6(),
                _ => true,
            })
            .collect();
        if ips.is_empty() {
            None
        } else {
            Some(ips)
        }
    }
}
