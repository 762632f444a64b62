//! In-memory dialer/connector doubles for routing tests.
//!
//! Every dialed stream is one half of a `tokio::io::duplex` pair whose other
//! half echoes. Live streams are counted so tests can assert that failed
//! attempts leave nothing open.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::common::{split_host_port, Address, Error, Network, Result, Stream};
use crate::connector::{BindOptions, Connector};
use crate::selector::{FifoStrategy, Selector, Strategy};
use crate::transport::{Dialer, DialerOptions, Listener, Transport, TransportOptions};

use super::Node;

#[derive(Default)]
struct ProbeState {
    open: AtomicUsize,
    events: Mutex<Vec<String>>,
    fail_dial: Mutex<HashSet<String>>,
    fail_handshake: Mutex<HashSet<String>>,
    fail_connect: Mutex<HashSet<String>>,
    stall_dial: Mutex<HashSet<String>>,
}

/// Shared observation point for the doubles
#[derive(Clone, Default)]
pub(crate) struct Probe {
    state: Arc<ProbeState>,
}

impl Probe {
    /// Node `name` at `name:1080`
    pub(crate) fn node(&self, name: &str) -> Node {
        self.build(name, false)
    }

    /// Node whose dialer reports multiplexing
    pub(crate) fn mux_node(&self, name: &str) -> Node {
        self.build(name, true)
    }

    fn build(&self, name: &str, multiplex: bool) -> Node {
        let addr = format!("{}:1080", name);
        let transport = Transport::new(
            Arc::new(MockDialer {
                probe: self.clone(),
                multiplex,
            }),
            Arc::new(MockConnector {
                probe: self.clone(),
                label: name.to_string(),
            }),
        )
        .with_options(TransportOptions {
            addr: addr.clone(),
            ..Default::default()
        });
        Node::new(name, addr).with_transport(transport)
    }

    pub(crate) fn fail_dial(&self, name: &str) {
        self.state.fail_dial.lock().insert(name.to_string());
    }

    pub(crate) fn heal_dial(&self, name: &str) {
        self.state.fail_dial.lock().remove(name);
    }

    pub(crate) fn fail_handshake(&self, name: &str) {
        self.state.fail_handshake.lock().insert(name.to_string());
    }

    pub(crate) fn fail_connect(&self, name: &str) {
        self.state.fail_connect.lock().insert(name.to_string());
    }

    /// Dials to `name` never complete
    pub(crate) fn stall_dial(&self, name: &str) {
        self.state.stall_dial.lock().insert(name.to_string());
    }

    /// Streams currently alive
    pub(crate) fn open(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.state.events.lock().clone()
    }

    fn record(&self, event: String) {
        self.state.events.lock().push(event);
    }

    fn tracked(&self) -> Stream {
        let (local, peer) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let (mut r, mut w) = tokio::io::split(peer);
            let _ = tokio::io::copy(&mut r, &mut w).await;
        });
        self.state.open.fetch_add(1, Ordering::SeqCst);
        Box::new(TrackedStream {
            inner: local,
            state: self.state.clone(),
        })
    }
}

fn host_of(addr: &str) -> String {
    split_host_port(addr)
        .map(|(h, _)| h)
        .unwrap_or(addr)
        .to_string()
}

fn refused(what: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        what.to_string(),
    ))
}

struct TrackedStream {
    inner: DuplexStream,
    state: Arc<ProbeState>,
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

pub(crate) struct MockDialer {
    probe: Probe,
    multiplex: bool,
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, addr: &str, opts: &DialerOptions) -> Result<Stream> {
        let host = host_of(addr);
        self.probe.record(format!("dial {}", host));
        if self.probe.state.fail_dial.lock().contains(&host) {
            return Err(refused(&host));
        }
        let stall = self.probe.state.stall_dial.lock().contains(&host);
        if stall {
            std::future::pending::<()>().await;
        }
        if opts.net_dialer.route.is_some() {
            return opts.net_dialer.dial(Network::Tcp, addr).await;
        }
        Ok(self.probe.tracked())
    }

    async fn handshake(&self, stream: Stream, opts: &DialerOptions) -> Result<Stream> {
        let host = host_of(&opts.host);
        self.probe.record(format!("handshake {}", host));
        if self.probe.state.fail_handshake.lock().contains(&host) {
            return Err(Error::Protocol(format!("handshake {} rejected", host)));
        }
        Ok(stream)
    }

    fn multiplex(&self) -> bool {
        self.multiplex
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub(crate) struct MockConnector {
    probe: Probe,
    label: String,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, stream: Stream, network: Network, address: &str) -> Result<Stream> {
        self.probe
            .record(format!("connect {} -> {}/{}", self.label, address, network));
        if self.probe.state.fail_connect.lock().contains(&self.label) {
            return Err(refused(address));
        }
        Ok(stream)
    }

    async fn bind(
        &self,
        stream: Stream,
        network: Network,
        address: &str,
        _opts: &BindOptions,
    ) -> Result<Box<dyn Listener>> {
        self.probe
            .record(format!("bind {} -> {}/{}", self.label, address, network));
        Ok(Box::new(MockListener {
            _stream: Mutex::new(stream),
            addr: address.parse()?,
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct MockListener {
    _stream: Mutex<Stream>,
    addr: Address,
}

#[async_trait]
impl Listener for MockListener {
    async fn accept(&self) -> Result<(Stream, Address)> {
        Err(Error::Unsupported("mock accept".into()))
    }

    fn local_addr(&self) -> Result<Address> {
        Ok(self.addr.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// FIFO selector that counts how often it was asked.
#[derive(Default)]
pub(crate) struct CountingSelector {
    hits: AtomicUsize,
}

impl CountingSelector {
    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Selector<Arc<Node>> for CountingSelector {
    fn select(&self, candidates: &[Arc<Node>]) -> Option<Arc<Node>> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        FifoStrategy.apply(candidates).cloned()
    }
}
