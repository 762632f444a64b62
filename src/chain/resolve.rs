//! Address resolution for hops and destinations

use tracing::{debug, error};

use crate::common::{join_host_port, split_host_port, Error, Result};
use crate::hosts::HostMapper;
use crate::resolver::Resolver;

/// Resolve the host part of `addr` (`host:port`).
///
/// The host mapper is consulted first. A resolver answering
/// `Error::InvalidName` leaves the address untouched; any other failure or
/// an empty answer is reported as `Error::Resolve`. Without either backend
/// the address is returned unchanged.
pub async fn resolve(
    network: &str,
    addr: &str,
    resolver: Option<&dyn Resolver>,
    hosts: Option<&dyn HostMapper>,
) -> Result<String> {
    if addr.is_empty() {
        return Ok(String::new());
    }
    let Some((host, port)) = split_host_port(addr) else {
        return Ok(addr.to_string());
    };
    if host.is_empty() {
        return Ok(addr.to_string());
    }

    if let Some(hosts) = hosts {
        if let Some(ip) = hosts.lookup(network, host).await.and_then(|ips| ips.first().copied()) {
            debug!("hit host mapper: {} -> {}", host, ip);
            return Ok(join_host_port(&ip.to_string(), port));
        }
    }

    let Some(resolver) = resolver else {
        return Ok(addr.to_string());
    };

    let ips = match resolver.resolve(network, host).await {
        Ok(ips) => ips,
        Err(Error::InvalidName(_)) => return Ok(addr.to_string()),
        Err(e) => {
            error!("resolve {}: {}", host, e);
            Vec::new()
        }
    };
    match ips.first() {
        Some(ip) => Ok(join_host_port(&ip.to_string(), port)),
        None => Err(Error::Resolve(host.to_string())),
    }
}
