//! Connector Layer
//!
//! A connector speaks a relay protocol over an already dialed stream and
//! asks the peer to open the next leg: `connect` for an outbound stream,
//! `bind` for a listener on the peer side.

mod forward;
mod http;
mod socks5;

pub use forward::ForwardConnector;
pub use http::HttpConnector;
pub use socks5::Socks5Connector;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::{Error, Network, Result, Stream};
use crate::transport::Listener;

/// Relay protocol client
#[async_trait]
pub trait Connector: Send + Sync {
    /// Request a stream to `address` from the peer behind `stream`.
    async fn connect(&self, stream: Stream, network: Network, address: &str) -> Result<Stream>;

    /// Per-connection setup run once right after dialing. Defaults to passthrough.
    async fn handshake(&self, stream: Stream) -> Result<Stream> {
        Ok(stream)
    }

    /// Request a listener on `address` from the peer behind `stream`.
    async fn bind(
        &self,
        stream: Stream,
        _network: Network,
        _address: &str,
        _opts: &BindOptions,
    ) -> Result<Box<dyn Listener>> {
        drop(stream);
        Err(Error::BindUnsupported(self.name().to_string()))
    }

    fn name(&self) -> &'static str;
}

/// Options for `bind`
#[derive(Debug, Clone, Default)]
pub struct BindOptions {
    /// Listen backlog, 0 for the default
    pub backlog: u32,
    /// Multiplex accepted connections over one session
    pub mux: bool,
    /// Read buffer size per UDP conversation, 0 for the default
    pub udp_buffer_size: usize,
    /// Per-conversation UDP queue length
    pub udp_queue_size: usize,
    /// Idle time after which a UDP conversation is dropped
    pub udp_conn_ttl: Option<Duration>,
}

/// Username/password credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub username: String,
    #[serde(default)]
    pub password: String,
}
