//! Route - a concrete hop sequence for one request
//!
//! ```text
//! nodes[0].dial ─► handshake ─► connect(nodes[1]) ─► handshake ─► ... ─► connect(target)
//! ```
//!
//! `nodes[i]`'s connector asks its peer to open the next leg; the last
//! node's connector reaches the destination. A route is built fresh for
//! every attempt and never shared between calls.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::common::{Error, Network, Result, Stream};
use crate::connector::BindOptions;
use crate::hosts::HostMapper;
use crate::metrics::{CHAIN_ERRORS_TOTAL, NODE_CONNECT_DURATION};
use crate::resolver::Resolver;
use crate::selector::FailMarker;
use crate::transport::{listen_tcp, listen_udp, Listener, NetDialer, SockOpts};

use super::resolve::resolve;
use super::Node;

/// Options applied when a route dials
#[derive(Clone, Default)]
pub struct DialOptions {
    /// Every hop step and the final connect must finish by then
    pub deadline: Option<tokio::time::Instant>,
    pub interface: Option<String>,
    pub netns: Option<String>,
    pub sock_opts: Option<SockOpts>,
    /// Fallback resolver for hops without their own
    pub resolver: Option<Arc<dyn Resolver>>,
    /// Fallback host mapper for hops without their own
    pub hosts: Option<Arc<dyn HostMapper>>,
}

impl std::fmt::Debug for DialOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialOptions")
            .field("deadline", &self.deadline)
            .field("interface", &self.interface)
            .field("netns", &self.netns)
            .field("sock_opts", &self.sock_opts)
            .field("resolver", &self.resolver.is_some())
            .field("hosts", &self.hosts.is_some())
            .finish()
    }
}

/// The chain a route was built from
#[derive(Clone)]
pub(crate) struct RouteOwner {
    pub(crate) name: String,
    pub(crate) marker: Arc<FailMarker>,
}

#[derive(Clone, Default)]
pub struct Route {
    owner: Option<RouteOwner>,
    nodes: Vec<Arc<Node>>,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_owner(mut self, owner: RouteOwner) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn add_node(&mut self, node: Arc<Node>) {
        self.nodes.push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_node(&self, index: usize) -> Option<&Arc<Node>> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Name of the chain this route came from, if any.
    pub fn chain_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.name.as_str())
    }

    /// Every hop traversed, including those absorbed into multiplexed
    /// transports, in dial order.
    pub fn path(&self) -> Vec<Arc<Node>> {
        let mut path = Vec::new();
        for node in &self.nodes {
            if let Some(route) = node.transport().and_then(|t| t.route()) {
                path.extend(route.path());
            }
            path.push(node.clone());
        }
        path
    }

    /// Connect to `address` through every hop of the route. An empty route
    /// dials directly.
    pub async fn dial(&self, network: Network, address: &str, opts: DialOptions) -> Result<Stream> {
        let Some(last) = self.nodes.last() else {
            let dialer = NetDialer {
                interface: opts.interface.clone(),
                netns: opts.netns.clone(),
                mark: opts.sock_opts.map(|so| so.mark).filter(|m| *m != 0),
                ..Default::default()
            };
            return within(opts.deadline, dialer.dial_local(network, address)).await;
        };

        let stream = self.connect(&opts).await?;
        let transport = last.require_transport()?;
        within(opts.deadline, transport.connect(stream, network, address)).await
    }

    /// Listen on `address`. An empty route binds locally; otherwise the last
    /// hop's connector binds on its peer. `dial_opts` applies to the hops.
    pub async fn bind(
        &self,
        network: Network,
        address: &str,
        opts: &BindOptions,
        dial_opts: DialOptions,
    ) -> Result<Box<dyn Listener>> {
        let Some(last) = self.nodes.last() else {
            return bind_local(network, address, opts).await;
        };

        let stream = self.connect(&dial_opts).await?;
        last.require_transport()?
            .bind(stream, network, address, opts)
            .await
    }

    /// Open a stream that has passed through every hop's handshake.
    async fn connect(&self, opts: &DialOptions) -> Result<Stream> {
        let first = self.nodes.first().ok_or(Error::EmptyRoute)?;

        let result = self.connect_hops(first, opts).await;
        if let Some(owner) = &self.owner {
            match &result {
                Ok(_) => owner.marker.reset(),
                Err(_) => {
                    owner.marker.mark();
                    CHAIN_ERRORS_TOTAL
                        .with_label_values(&[owner.name.as_str(), first.name.as_str()])
                        .inc();
                }
            }
        }
        result
    }

    async fn connect_hops(&self, first: &Node, opts: &DialOptions) -> Result<Stream> {
        let start = Instant::now();
        let mut stream = match within(opts.deadline, connect_first(first, opts)).await {
            Ok(stream) => {
                first.fail_marker().reset();
                stream
            }
            Err(e) => {
                first.fail_marker().mark();
                return Err(e);
            }
        };
        if let Some(owner) = &self.owner {
            NODE_CONNECT_DURATION
                .with_label_values(&[owner.name.as_str(), first.name.as_str()])
                .observe(start.elapsed().as_secs_f64());
        }

        let mut prev = first;
        for node in &self.nodes[1..] {
            stream = match within(opts.deadline, connect_next(prev, node, stream, opts)).await {
                Ok(stream) => {
                    node.fail_marker().reset();
                    stream
                }
                Err(e) => {
                    node.fail_marker().mark();
                    return Err(e);
                }
            };
            prev = node.as_ref();
        }
        Ok(stream)
    }
}

/// Run one step against the dial deadline. An expired step fails with
/// `Error::Timeout`, so the hop it belonged to gets marked.
pub(crate) async fn within<T>(
    deadline: Option<tokio::time::Instant>,
    step: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, step)
            .await
            .unwrap_or(Err(Error::Timeout)),
        None => step.await,
    }
}

async fn resolve_node(node: &Node, opts: &DialOptions) -> Result<String> {
    let resolver = node.resolver().or(opts.resolver.as_ref());
    let hosts = node.host_mapper().or(opts.hosts.as_ref());
    resolve("ip", &node.addr, resolver.map(|r| r.as_ref()), hosts.map(|h| h.as_ref())).await
}

async fn connect_first(node: &Node, opts: &DialOptions) -> Result<Stream> {
    let transport = node.require_transport()?;
    let addr = resolve_node(node, opts).await?;
    debug!("dial {} ({})", node, addr);
    let stream = transport.dial(&addr, opts).await?;
    transport.handshake(stream).await
}

/// Extend `stream` (ending at `prev`) to `node`. On error `stream` is dropped.
async fn connect_next(prev: &Node, node: &Node, stream: Stream, opts: &DialOptions) -> Result<Stream> {
    let transport = node.require_transport()?;
    let addr = resolve_node(node, opts).await?;
    debug!("connect {} -> {} ({})", prev, node, addr);
    let stream = prev
        .require_transport()?
        .connect(stream, Network::Tcp, &addr)
        .await?;
    transport.handshake(stream).await
}

async fn local_addr(network: Network, address: &str) -> Result<SocketAddr> {
    let addr = if address.starts_with(':') {
        format!("{}{}", if network.ip_family() == "ip6" { "[::]" } else { "0.0.0.0" }, address)
    } else {
        address.to_string()
    };
    let found = tokio::net::lookup_host(&addr)
        .await?
        .find(|sa| match network.ip_family() {
            "ip4" => sa.is_ipv4(),
            "ip6" => sa.is_ipv6(),
            _ => true,
        });
    found.ok_or_else(|| Error::InvalidAddress(address.to_string()))
}

async fn bind_local(network: Network, address: &str, opts: &BindOptions) -> Result<Box<dyn Listener>> {
    match network {
        Network::Tcp | Network::Tcp4 | Network::Tcp6 => {
            let addr = local_addr(network, address).await?;
            debug!("bind on {}/{} (backlog {})", addr, network, opts.backlog);
            listen_tcp(addr, opts.backlog)
        }
        Network::Udp | Network::Udp4 | Network::Udp6 => {
            let addr = local_addr(network, address).await?;
            debug!("bind on {}/{}", addr, network);
            listen_udp(addr, opts.udp_buffer_size).await
        }
        Network::Unix => Err(Error::Unsupported(format!("bind on network {}", network))),
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("chain", &self.chain_name())
            .field("nodes", &self.nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::Probe;
    use crate::chain::{Chain, Chainer, NodeGroup};
    use crate::hosts::StaticHosts;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn chain(probe: &Probe, names: &[&str]) -> Chain {
        Chain::new(
            "c",
            names
                .iter()
                .map(|n| NodeGroup::new(vec![probe.node(n)]))
                .collect(),
        )
    }

    fn marker_count(chain: &Chain, hop: usize) -> u64 {
        chain.groups()[hop].nodes()[0].fail_marker().count()
    }

    #[tokio::test]
    async fn test_dial_walks_every_hop() {
        let probe = Probe::default();
        let chain = chain(&probe, &["n1", "n2", "n3"]);

        let route = chain.route(Network::Tcp, "example.com:80");
        let mut stream = route
            .dial(Network::Tcp, "example.com:80", DialOptions::default())
            .await
            .unwrap();
        assert_eq!(
            probe.events(),
            vec![
                "dial n1",
                "handshake n1",
                "connect n1 -> n2:1080/tcp",
                "handshake n2",
                "connect n2 -> n3:1080/tcp",
                "handshake n3",
                "connect n3 -> example.com:80/tcp",
            ]
        );

        stream.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(probe.open(), 1);
    }

    #[tokio::test]
    async fn test_later_hop_failure_marks_only_that_hop() {
        let probe = Probe::default();
        probe.fail_handshake("n2");
        let chain = chain(&probe, &["n1", "n2"]);

        let route = chain.route(Network::Tcp, "example.com:80");
        let err = route
            .dial(Network::Tcp, "example.com:80", DialOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(marker_count(&chain, 0), 0);
        assert_eq!(marker_count(&chain, 1), 1);
        assert_eq!(chain.marker().unwrap().count(), 1);
        assert_eq!(probe.open(), 0);
    }

    #[tokio::test]
    async fn test_success_resets_markers() {
        let probe = Probe::default();
        probe.fail_dial("n1");
        let chain = chain(&probe, &["n1"]);

        let route = chain.route(Network::Tcp, "example.com:80");
        assert!(route
            .dial(Network::Tcp, "example.com:80", DialOptions::default())
            .await
            .is_err());
        assert_eq!(marker_count(&chain, 0), 1);
        assert_eq!(chain.marker().unwrap().count(), 1);

        probe.heal_dial("n1");
        let route = chain.route(Network::Tcp, "example.com:80");
        route
            .dial(Network::Tcp, "example.com:80", DialOptions::default())
            .await
            .unwrap();
        assert_eq!(marker_count(&chain, 0), 0);
        assert_eq!(chain.marker().unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_final_connect_failure_leaves_hops_healthy() {
        let probe = Probe::default();
        probe.fail_connect("n1");
        let chain = chain(&probe, &["n1"]);

        let route = chain.route(Network::Tcp, "example.com:80");
        assert!(route
            .dial(Network::Tcp, "example.com:80", DialOptions::default())
            .await
            .is_err());
        assert_eq!(marker_count(&chain, 0), 0);
        assert_eq!(probe.open(), 0);
    }

    #[tokio::test]
    async fn test_sealed_route_dials_through_inner_hops() {
        let probe = Probe::default();
        let chain = Chain::new(
            "c",
            vec![
                NodeGroup::new(vec![probe.node("n1")]),
                NodeGroup::new(vec![probe.mux_node("m")]),
            ],
        );

        let route = chain.route(Network::Tcp, "example.com:80");
        assert_eq!(route.len(), 1);
        route
            .dial(Network::Tcp, "example.com:80", DialOptions::default())
            .await
            .unwrap();
        assert_eq!(
            probe.events(),
            vec![
                "dial m",
                "dial n1",
                "handshake n1",
                "connect n1 -> m:1080/tcp",
                "handshake m",
                "connect m -> example.com:80/tcp",
            ]
        );
    }

    #[tokio::test]
    async fn test_sealed_route_inherits_dial_options() {
        let probe = Probe::default();
        let chain = Chain::new(
            "c",
            vec![
                NodeGroup::new(vec![probe.node("n1")]),
                NodeGroup::new(vec![probe.mux_node("m")]),
            ],
        );
        let opts = DialOptions {
            hosts: Some(Arc::new(
                StaticHosts::new().with_entry("n1", vec!["10.0.0.1".parse().unwrap()]),
            )),
            ..Default::default()
        };

        let route = chain.route(Network::Tcp, "example.com:80");
        route.dial(Network::Tcp, "example.com:80", opts).await.unwrap();
        assert_eq!(
            probe.events(),
            vec![
                "dial m",
                "dial 10.0.0.1",
                "handshake n1",
                "connect n1 -> m:1080/tcp",
                "handshake m",
                "connect m -> example.com:80/tcp",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_marks_stalled_hop() {
        let probe = Probe::default();
        probe.stall_dial("n1");
        let chain = chain(&probe, &["n1"]);
        let opts = DialOptions {
            deadline: Some(tokio::time::Instant::now() + std::time::Duration::from_secs(5)),
            ..Default::default()
        };

        let route = chain.route(Network::Tcp, "example.com:80");
        let err = route
            .dial(Network::Tcp, "example.com:80", opts)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(marker_count(&chain, 0), 1);
        assert_eq!(chain.marker().unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_udp_destination_uses_tcp_between_hops() {
        let probe = Probe::default();
        let chain = chain(&probe, &["n1", "n2"]);

        let route = chain.route(Network::Udp, "10.0.0.53:53");
        route
            .dial(Network::Udp, "10.0.0.53:53", DialOptions::default())
            .await
            .unwrap();
        let events = probe.events();
        assert!(events.contains(&"connect n1 -> n2:1080/tcp".to_string()));
        assert_eq!(events.last().unwrap(), "connect n2 -> 10.0.0.53:53/udp");
    }

    #[tokio::test]
    async fn test_missing_transport() {
        let mut route = Route::new();
        route.add_node(Arc::new(Node::new("bare", "bare:1080")));
        let err = route
            .dial(Network::Tcp, "example.com:80", DialOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::NoTransport(_)));
    }

    #[tokio::test]
    async fn test_empty_route_binds_locally() {
        let route = Route::new();
        let ln = route
            .bind(Network::Tcp, "127.0.0.1:0", &BindOptions::default(), DialOptions::default())
            .await
            .unwrap();
        let addr = ln.local_addr().unwrap().as_socket().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);

        let ln = route
            .bind(Network::Udp, "127.0.0.1:0", &BindOptions::default(), DialOptions::default())
            .await
            .unwrap();
        assert_ne!(ln.local_addr().unwrap().port(), 0);

        let err = route
            .bind(Network::Unix, "/tmp/relay.sock", &BindOptions::default(), DialOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_local_addr_expands_bare_port() {
        let addr = local_addr(Network::Tcp4, ":8080").await.unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:8080");
        let addr = local_addr(Network::Tcp6, ":8080").await.unwrap();
        assert_eq!(addr.to_string(), "[::]:8080");
    }

    #[tokio::test]
    async fn test_bind_through_last_hop() {
        let probe = Probe::default();
        let chain = chain(&probe, &["n1", "n2"]);

        let route = chain.route(Network::Tcp, "0.0.0.0:9000");
        let ln = route
            .bind(Network::Tcp, "0.0.0.0:9000", &BindOptions::default(), DialOptions::default())
            .await
            .unwrap();
        assert_eq!(ln.local_addr().unwrap().to_string(), "0.0.0.0:9000");
        assert_eq!(
            probe.events().last().unwrap(),
            "bind n2 -> 0.0.0.0:9000/tcp"
        );
    }
}
