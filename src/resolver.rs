//! Name resolution

use std::net::IpAddr;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

/// DNS-style resolver.
///
/// Implementations return `Error::InvalidName` for names they cannot
/// handle; callers then keep the unresolved address. Any other error, or an
/// empty answer, means the name does not exist.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// `network` is "ip", "ip4" or "ip6".
    async fn resolve(&self, network: &str, host: &str) -> Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, network: &str, host: &str) -> Result<Vec<IpAddr>> {
        if host.is_empty() {
            return Err(Error::InvalidName(host.to_string()));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|_| Error::Resolve(host.to_string()))?;
        let ips: Vec<IpAddr> = addrs
            .map(|a| a.ip())
            .filter(|ip| match network {
                "ip4" => ip.is_ipv4(),
                "ip6" => ip.is_ipv6(),
                _ => true,
            })
            .collect();

        debug!("resolve {}/{}: {:?}", host, network, ips);
        Ok(ips)
    }
}
