//! Transport Layer
//!
//! A node reaches its peer in two steps, each handled by its own trait:
//!
//! ```text
//! Dialer:    addr → Stream            (raw connect + optional handshake, e.g. TLS)
//! Connector: Stream → Stream          (relay request: CONNECT / BIND to the next hop)
//! ```
//!
//! `Transport` binds one dialer and one connector together with the socket
//! options a node was configured with. When a transport carries a `Route`
//! (a multiplexed node that absorbed the hops before it), dialing goes
//! through that route instead of the local network.

mod net;
mod tcp;
mod tls;
mod udp;

pub use net::{NetDialer, DEFAULT_DIAL_TIMEOUT};
pub use tcp::{listen_tcp, TcpDialer};
pub use tls::{TlsConfig, TlsDialer};
pub use udp::{listen_udp, UdpStream};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::chain::{DialOptions, Route};
use crate::common::{Address, Network, Result, Stream};
use crate::connector::{BindOptions, Connector};

/// Dialer establishes the raw connection to a node and optionally wraps it.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to `addr` (already resolved where possible).
    async fn dial(&self, addr: &str, opts: &DialerOptions) -> Result<Stream>;

    /// Wrap a freshly dialed stream (TLS, framing). Defaults to passthrough.
    async fn handshake(&self, stream: Stream, _opts: &DialerOptions) -> Result<Stream> {
        Ok(stream)
    }

    /// Whether one dialed session can carry many logical routes.
    fn multiplex(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Per-call dialer options
#[derive(Clone, Default)]
pub struct DialerOptions {
    /// Configured node address, before resolution (used for SNI and Host).
    pub host: String,
    pub net_dialer: NetDialer,
}

/// Listener trait for accepting incoming connections
#[async_trait]
pub trait Listener: Send + Sync {
    /// Accept a new connection
    async fn accept(&self) -> Result<(Stream, Address)>;

    /// Get the local bound address
    fn local_addr(&self) -> Result<Address>;

    /// Close the listener
    async fn close(&self) -> Result<()>;
}

/// Socket-level options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SockOpts {
    /// `SO_MARK` value, 0 for none
    pub mark: u32,
}

/// Options a transport was built with
#[derive(Clone, Default)]
pub struct TransportOptions {
    /// Node address as configured (host:port)
    pub addr: String,
    /// Outbound interface name(s) or local IP(s), comma separated
    pub interface: Option<String>,
    /// Network namespace to dial from
    pub netns: Option<String>,
    pub sock_opts: Option<SockOpts>,
    /// Route this transport dials through (set when sealed by a multiplexed hop)
    pub route: Option<Route>,
    pub timeout: Option<Duration>,
}

/// A node's transport capability: dialer + connector + options
#[derive(Clone)]
pub struct Transport {
    dialer: Arc<dyn Dialer>,
    connector: Arc<dyn Connector>,
    options: TransportOptions,
}

impl Transport {
    pub fn new(dialer: Arc<dyn Dialer>, connector: Arc<dyn Connector>) -> Self {
        Self {
            dialer,
            connector,
            options: TransportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// The route embedded by sealing, if any.
    pub fn route(&self) -> Option<&Route> {
        self.options.route.as_ref()
    }

    /// Copy of this transport that dials through `route`.
    pub fn with_route(&self, route: Route) -> Transport {
        let mut tr = self.clone();
        tr.options.route = Some(route);
        tr
    }

    pub fn multiplex(&self) -> bool {
        self.dialer.multiplex()
    }

    pub fn connector_name(&self) -> &'static str {
        self.connector.name()
    }

    fn net_dialer(&self, route_options: DialOptions) -> NetDialer {
        NetDialer {
            interface: self.options.interface.clone(),
            netns: self.options.netns.clone(),
            mark: self.options.sock_opts.map(|so| so.mark).filter(|m| *m != 0),
            timeout: self.options.timeout,
            route: self.options.route.clone().filter(|r| !r.is_empty()),
            route_options,
        }
    }

    fn dialer_options(&self, route_options: DialOptions) -> DialerOptions {
        DialerOptions {
            host: self.options.addr.clone(),
            net_dialer: self.net_dialer(route_options),
        }
    }

    /// Dial the node at `addr`. A sealed transport passes `route_options`
    /// on to the route it dials through.
    pub async fn dial(&self, addr: &str, route_options: &DialOptions) -> Result<Stream> {
        let opts = self.dialer_options(route_options.clone());
        self.dialer.dial(addr, &opts).await
    }

    /// Dialer handshake followed by connector handshake.
    pub async fn handshake(&self, stream: Stream) -> Result<Stream> {
        let opts = self.dialer_options(DialOptions::default());
        let stream = self.dialer.handshake(stream, &opts).await?;
        self.connector.handshake(stream).await
    }

    /// Ask the peer behind `stream` to connect onwards to `address`.
    pub async fn connect(&self, stream: Stream, network: Network, address: &str) -> Result<Stream> {
        self.connector.connect(stream, network, address).await
    }

    /// Ask the peer behind `stream` to listen on `address` for us.
    pub async fn bind(
        &self,
        stream: Stream,
        network: Network,
        address: &str,
        opts: &BindOptions,
    ) -> Result<Box<dyn Listener>> {
        self.connector.bind(stream, network, address, opts).await
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("dialer", &self.dialer.name())
            .field("connector", &self.connector.name())
            .field("addr", &self.options.addr)
            .field("sealed", &self.options.route.as_ref().map(|r| r.len()))
            .finish()
    }
}
