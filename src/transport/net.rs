//! Plain network dialer
//!
//! `NetDialer` opens the underlying TCP/UDP/unix socket for every dialer
//! implementation. It honours the node's socket options (outbound
//! interface, network namespace, `SO_MARK`) and, when a route is attached,
//! tunnels the connection through that route instead.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpSocket, TcpStream, UdpSocket};
use tracing::{debug, warn};

use crate::chain::{DialOptions, Route};
use crate::common::{Error, Network, Result, Stream};

use super::udp::UdpStream;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

type DialFuture<'a> = Pin<Box<dyn Future<Output = Result<Stream>> + Send + 'a>>;

#[derive(Clone, Default, Debug)]
pub struct NetDialer {
    /// Interface names or local IPs, comma separated. A trailing `!` on an
    /// entry stops the fallback to the next one when it fails.
    pub interface: Option<String>,
    pub netns: Option<String>,
    pub mark: Option<u32>,
    pub timeout: Option<Duration>,
    pub route: Option<Route>,
    /// Options the attached route dials with
    pub route_options: DialOptions,
}

/// One entry of the interface list
#[derive(Debug, Clone, PartialEq, Eq)]
struct IfaceSpec {
    name: String,
    strict: bool,
}

fn parse_interfaces(s: &str) -> Vec<IfaceSpec> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_suffix('!') {
            Some(name) => IfaceSpec {
                name: name.to_string(),
                strict: true,
            },
            None => IfaceSpec {
                name: s.to_string(),
                strict: false,
            },
        })
        .collect()
}

impl NetDialer {
    pub async fn dial(&self, network: Network, addr: &str) -> Result<Stream> {
        if let Some(route) = self.route.as_ref().filter(|r| !r.is_empty()) {
            debug!("dial {}/{} through route of {} hop(s)", addr, network, route.len());
            let fut: DialFuture<'_> =
                Box::pin(route.dial(network, addr, self.route_options.clone()));
            return fut.await;
        }
        self.dial_local(network, addr).await
    }

    /// Dial on the local network, ignoring any attached route.
    pub fn dial_local<'a>(&'a self, network: Network, addr: &'a str) -> DialFuture<'a> {
        Box::pin(async move {
            let timeout = self.timeout.filter(|t| !t.is_zero()).unwrap_or(DEFAULT_DIAL_TIMEOUT);
            match tokio::time::timeout(timeout, self.dial_direct(network, addr)).await {
                Ok(r) => r,
                Err(_) => Err(Error::Timeout),
            }
        })
    }

    async fn dial_direct(&self, network: Network, addr: &str) -> Result<Stream> {
        if network == Network::Unix {
            return dial_unix(addr).await;
        }

        let targets = resolve_targets(network, addr).await?;

        if let Some(ns) = self.netns.as_deref().filter(|s| !s.is_empty()) {
            return self.dial_in_netns(ns, network, targets).await;
        }

        let ifaces = self
            .interface
            .as_deref()
            .map(parse_interfaces)
            .unwrap_or_default();
        if ifaces.is_empty() {
            return self.dial_targets(network, &targets, None).await;
        }

        let mut last_err = None;
        for iface in &ifaces {
            match self.dial_targets(network, &targets, Some(&iface.name)).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("dial {} via interface {} failed: {}", addr, iface.name, e);
                    if iface.strict {
                        return Err(e);
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::InvalidAddress(addr.to_string())))
    }

    async fn dial_targets(
        &self,
        network: Network,
        targets: &[SocketAddr],
        iface: Option<&str>,
    ) -> Result<Stream> {
        let mut last_err = None;
        for target in targets {
            let res = if network.is_udp() {
                self.dial_udp(*target, iface).await
            } else {
                self.dial_tcp(*target, iface).await
            };
            match res {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::InvalidAddress("no dial target".into())))
    }

    async fn dial_tcp(&self, target: SocketAddr, iface: Option<&str>) -> Result<Stream> {
        let socket = new_socket(target, Type::STREAM, Protocol::TCP)?;
        self.apply_options(&socket, target, iface)?;
        socket.set_nonblocking(true)?;

        let socket = TcpSocket::from_std_stream(socket.into());
        let stream = socket.connect(target).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    async fn dial_udp(&self, target: SocketAddr, iface: Option<&str>) -> Result<Stream> {
        let socket = new_socket(target, Type::DGRAM, Protocol::UDP)?;
        self.apply_options(&socket, target, iface)?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        socket.connect(target).await?;
        Ok(Box::new(UdpStream::new(socket, 0)))
    }

    /// Mark and interface binding. Failures to set the mark or bind the
    /// device are logged; a local address of the wrong family is an error.
    fn apply_options(&self, socket: &Socket, target: SocketAddr, iface: Option<&str>) -> Result<()> {
        if let Some(mark) = self.mark.filter(|m| *m != 0) {
            if let Err(e) = set_mark(socket, mark) {
                warn!("set mark {}: {}", mark, e);
            }
        }

        let Some(iface) = iface else {
            return Ok(());
        };

        match iface.parse::<IpAddr>() {
            Ok(ip) => {
                if ip.is_ipv4() != target.is_ipv4() {
                    return Err(Error::Transport(format!(
                        "local address {} does not match {}",
                        ip, target
                    )));
                }
                socket.bind(&SocketAddr::new(ip, 0).into())?;
            }
            Err(_) => {
                if let Err(e) = bind_device(socket, iface) {
                    warn!("bind device {}: {}", iface, e);
                }
            }
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    async fn dial_in_netns(
        &self,
        ns: &str,
        network: Network,
        targets: Vec<SocketAddr>,
    ) -> Result<Stream> {
        let ns = ns.to_string();
        let mark = self.mark.filter(|m| *m != 0);
        let timeout = self.timeout.filter(|t| !t.is_zero()).unwrap_or(DEFAULT_DIAL_TIMEOUT);

        // setns(2) applies to the calling thread only, so the connect runs
        // on a blocking thread that enters and leaves the namespace.
        let socket = tokio::task::spawn_blocking(move || {
            netns::within(&ns, || {
                let mut last_err = None;
                for target in &targets {
                    let ty = if network.is_udp() { Type::DGRAM } else { Type::STREAM };
                    let proto = if network.is_udp() { Protocol::UDP } else { Protocol::TCP };
                    let socket = new_socket(*target, ty, proto)?;
                    if let Some(mark) = mark {
                        if let Err(e) = set_mark(&socket, mark) {
                            warn!("set mark {}: {}", mark, e);
                        }
                    }
                    match socket.connect_timeout(&(*target).into(), timeout) {
                        Ok(()) => return Ok(socket),
                        Err(e) => last_err = Some(Error::Io(e)),
                    }
                }
                Err(last_err.unwrap_or_else(|| Error::InvalidAddress("no dial target".into())))
            })
        })
        .await
        .map_err(|e| Error::Transport(format!("netns dial task: {}", e)))??;

        socket.set_nonblocking(true)?;
        if network.is_udp() {
            let socket = UdpSocket::from_std(socket.into())?;
            Ok(Box::new(UdpStream::new(socket, 0)))
        } else {
            let stream = TcpStream::from_std(socket.into())?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
    }

    #[cfg(not(target_os = "linux"))]
    async fn dial_in_netns(
        &self,
        ns: &str,
        _network: Network,
        _targets: Vec<SocketAddr>,
    ) -> Result<Stream> {
        Err(Error::Unsupported(format!("netns {} on this platform", ns)))
    }
}

fn new_socket(target: SocketAddr, ty: Type, proto: Protocol) -> Result<Socket> {
    let domain = if target.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    Ok(Socket::new(domain, ty, Some(proto))?)
}

async fn resolve_targets(network: Network, addr: &str) -> Result<Vec<SocketAddr>> {
    let targets: Vec<SocketAddr> = tokio::net::lookup_host(addr)
        .await?
        .filter(|sa| match network.ip_family() {
            "ip4" => sa.is_ipv4(),
            "ip6" => sa.is_ipv6(),
            _ => true,
        })
        .collect();
    if targets.is_empty() {
        return Err(Error::Resolve(addr.to_string()));
    }
    Ok(targets)
}

#[cfg(unix)]
async fn dial_unix(addr: &str) -> Result<Stream> {
    let stream = tokio::net::UnixStream::connect(addr).await?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn dial_unix(addr: &str) -> Result<Stream> {
    Err(Error::Unsupported(format!("unix socket {}", addr)))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_mark(socket: &Socket, mark: u32) -> std::io::Result<()> {
    socket.set_mark(mark)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_mark(_socket: &Socket, _mark: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "SO_MARK"))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_device(socket: &Socket, iface: &str) -> std::io::Result<()> {
    socket.bind_device(Some(iface.as_bytes()))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_device(_socket: &Socket, _iface: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "SO_BINDTODEVICE"))
}

#[cfg(target_os = "linux")]
mod netns {
    use std::fs::File;
    use std::os::fd::AsRawFd;

    use crate::common::{Error, Result};

    fn ns_path(name: &str) -> String {
        if name.starts_with('/') {
            name.to_string()
        } else {
            format!("/var/run/netns/{}", name)
        }
    }

    fn setns(file: &File) -> std::io::Result<()> {
        let ret = unsafe { libc::setns(file.as_raw_fd(), libc::CLONE_NEWNET) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    /// Run `f` inside the named network namespace, then switch back.
    pub(super) fn within<T>(name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let origin = File::open("/proc/thread-self/ns/net")?;
        let target = File::open(ns_path(name))
            .map_err(|e| Error::Transport(format!("netns {}: {}", name, e)))?;

        setns(&target).map_err(|e| Error::Transport(format!("setns {}: {}", name, e)))?;
        let result = f();
        if let Err(e) = setns(&origin) {
            tracing::error!("restore netns after {}: {}", name, e);
        }
        result
    }

}
