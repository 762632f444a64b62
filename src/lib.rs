//! relaychain - multi-hop proxy chain routing
//!
//! # Architecture
//!
//! ```text
//! Router.dial(network, address)
//! → Chain.route()            pick one node per hop (selector + bypass)
//! → resolve(address)         host mapper, then resolver
//! → Route.dial()             dial hop 0, connect hop by hop, connect target
//! ```
//!
//! ## Core Principles
//!
//! - Routing only reads the configured graph and touches fail markers
//! - Every attempt builds a fresh route
//! - Dialers carry bytes to a hop, connectors speak the hop's proxy protocol
//! - Multiplexed nodes absorb the hops before them into their transport
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Core types: Stream, Address, Network, Metadata
//! ├── selector/        # Strategies, fail filter, fail marker
//! ├── transport/       # Dialers (tcp, tls), NetDialer, listeners
//! ├── connector/       # Proxy protocols: forward, http, socks5
//! ├── chain/           # Node, NodeGroup, Chain, ChainGroup, Route
//! ├── router/          # Retries, resolution, recording
//! └── app/             # Forwarders
//! ```

// Core types
pub mod common;
pub mod error;

// Routing
pub mod selector;
pub mod bypass;
pub mod hosts;
pub mod resolver;
pub mod recorder;
pub mod transport;
pub mod connector;
pub mod chain;
pub mod router;

// Supporting modules
pub mod metrics;
pub mod registry;
pub mod config;
pub mod app;

// Re-exports for convenience
pub use common::{Address, Metadata, Network, Stream};
pub use error::{Error, Result};
pub use config::Config;

pub use chain::{Chain, ChainGroup, Chainer, Node, NodeGroup, Route};
pub use registry::Registry;
pub use router::{Router, RouterOptions};
pub use transport::Transport;
