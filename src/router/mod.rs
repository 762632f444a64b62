//! Router - the entry point for outbound connections
//!
//! Responsibilities:
//! - Ask the chain for a route on every attempt
//! - Resolve the destination (host mapper first, then resolver)
//! - Retry failed attempts, each with a freshly built route
//! - Record dial events and keep the router metrics
//!
//! ```text
//! dial(network, address)
//!   └─ attempt i: chain.route() → resolve(address) → route.dial() ─┐
//!                 ▲                                                │ error
//!                 └────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, Level};

use crate::chain::{resolve, within, Chainer, DialOptions, Route};
use crate::common::{split_host_port, Address, Error, Network, PacketConn, Result, Stream, StreamPacketConn};
use crate::connector::BindOptions;
use crate::hosts::HostMapper;
use crate::metrics::{ROUTER_ATTEMPTS_TOTAL, ROUTER_FAILURES_TOTAL};
use crate::recorder::{RecordEvent, RecorderObject};
use crate::resolver::Resolver;
use crate::transport::{Listener, SockOpts};

/// Router configuration
#[derive(Clone, Default)]
pub struct RouterOptions {
    /// Extra attempts after the first one
    pub retries: usize,
    /// Budget for one whole attempt (resolve and every hop of the dial)
    pub timeout: Option<Duration>,
    pub interface: Option<String>,
    pub netns: Option<String>,
    pub sock_opts: Option<SockOpts>,
    pub chain: Option<Arc<dyn Chainer>>,
    pub resolver: Option<Arc<dyn Resolver>>,
    pub hosts: Option<Arc<dyn HostMapper>>,
    pub recorders: Vec<RecorderObject>,
}

#[derive(Clone, Default)]
pub struct Router {
    options: RouterOptions,
}

impl Router {
    pub fn new(options: RouterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    pub fn hosts(&self) -> Option<&Arc<dyn HostMapper>> {
        self.options.hosts.as_ref()
    }

    /// Open a stream to `address`.
    pub async fn dial(&self, network: Network, address: &str) -> Result<Stream> {
        let host = split_host_port(address)
            .map(|(h, _)| h)
            .filter(|h| !h.is_empty())
            .unwrap_or(address);
        self.record(RecordEvent::DialAddress, host.as_bytes()).await;

        let result = self.dial_with_retries(network, address).await;
        if result.is_err() {
            ROUTER_FAILURES_TOTAL.inc();
            self.record(RecordEvent::DialAddressError, host.as_bytes()).await;
        }
        result
    }

    /// Open a datagram session to `address`, presented as a packet
    /// connection bound to that single peer.
    pub async fn dial_packet(&self, network: Network, address: &str) -> Result<Box<dyn PacketConn>> {
        if !network.is_udp() {
            return Err(Error::Unsupported(format!("packet dial on network {}", network)));
        }
        let peer: Address = address.parse()?;
        let stream = self.dial(network, address).await?;
        Ok(Box::new(StreamPacketConn::new(stream, peer)))
    }

    /// Listen on `address`, locally or on the far end of the chain.
    pub async fn bind(
        &self,
        network: Network,
        address: &str,
        opts: &BindOptions,
    ) -> Result<Box<dyn Listener>> {
        let count = self.options.retries + 1;
        debug!("bind on {}/{}", address, network);

        let mut last_err = Error::EmptyRoute;
        for i in 0..count {
            let route = match &self.options.chain {
                Some(chain) => {
                    let route = chain.route(network, address);
                    if route.is_empty() {
                        return Err(Error::EmptyRoute);
                    }
                    route
                }
                None => Route::new(),
            };
            log_path(i, &route, address);

            match route.bind(network, address, opts, self.dial_options()).await {
                Ok(ln) => return Ok(ln),
                Err(e @ (Error::Unsupported(_) | Error::BindUnsupported(_))) => return Err(e),
                Err(e) => {
                    error!("route(retry={}) {}", i, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn dial_with_retries(&self, network: Network, address: &str) -> Result<Stream> {
        let count = self.options.retries + 1;
        debug!("dial {}/{}", address, network);

        let mut last_err = Error::EmptyRoute;
        for i in 0..count {
            ROUTER_ATTEMPTS_TOTAL.inc();
            match self.attempt(i, network, address).await {
                Ok(stream) => return Ok(stream),
                Err(e @ Error::Resolve(_)) => {
                    error!("{}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("route(retry={}) {}", i, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn attempt(&self, i: usize, network: Network, address: &str) -> Result<Stream> {
        let opts = self.dial_options();
        let route = self
            .options
            .chain
            .as_ref()
            .map(|chain| chain.route(network, address))
            .unwrap_or_default();
        log_path(i, &route, address);

        let resolving = resolve(
            network.ip_family(),
            address,
            self.options.resolver.as_deref(),
            self.options.hosts.as_deref(),
        );
        let address = within(opts.deadline, resolving).await?;

        route.dial(network, &address, opts).await
    }

    /// Options for one attempt; the deadline starts now.
    fn dial_options(&self) -> DialOptions {
        DialOptions {
            deadline: self
                .options
                .timeout
                .filter(|t| !t.is_zero())
                .map(|t| tokio::time::Instant::now() + t),
            interface: self.options.interface.clone(),
            netns: self.options.netns.clone(),
            sock_opts: self.options.sock_opts,
            resolver: self.options.resolver.clone(),
            hosts: self.options.hosts.clone(),
        }
    }

    async fn record(&self, event: RecordEvent, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if let Some(rec) = self.options.recorders.iter().find(|r| r.event == event) {
            if let Err(e) = rec.recorder.record(data).await {
                error!("record {}: {}", event, e);
            }
        }
    }
}

fn log_path(i: usize, route: &Route, address: &str) {
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }
    let mut path = String::new();
    for node in route.path() {
        path.push_str(&format!("{}@{} > ", node.name, node.addr));
    }
    path.push_str(address);
    debug!("route(retry={}) {}", i, path);
}
