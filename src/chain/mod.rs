//! Chain Layer
//!
//! ```text
//! Chain ─► [NodeGroup]* ─► route(network, address) ─► Route ─► dial / bind
//! ```
//!
//! A chain is the configured multi-hop template. Routing walks its groups
//! in order, lets each group's selector pick one node, and returns the
//! concrete `Route` for this request. Selection only reads the graph and
//! touches fail markers, so one chain serves any number of concurrent calls.

mod group;
mod hop;
mod node;
mod resolve;
mod route;

#[cfg(test)]
pub(crate) mod mock;

pub use group::ChainGroup;
pub use hop::NodeGroup;
pub use node::Node;
pub use resolve::resolve;
pub use route::{DialOptions, Route};
pub(crate) use route::within;

use std::sync::Arc;

use tracing::trace;

use crate::common::{Metadata, Network};
use crate::selector::{FailMarker, Selectable};

use route::RouteOwner;

/// Anything able to produce a route for a request.
pub trait Chainer: Send + Sync {
    fn route(&self, network: Network, address: &str) -> Route;

    /// Health marker used when chainers themselves are selected.
    fn marker(&self) -> Option<&FailMarker> {
        None
    }

    fn name(&self) -> &str;
}

impl Selectable for dyn Chainer {
    fn marker(&self) -> Option<&FailMarker> {
        Chainer::marker(self)
    }
}

/// An ordered list of hops.
pub struct Chain {
    name: String,
    groups: Vec<NodeGroup>,
    marker: Arc<FailMarker>,
    metadata: Metadata,
}

impl Chain {
    pub fn new(name: impl Into<String>, groups: Vec<NodeGroup>) -> Self {
        Self {
            name: name.into(),
            groups,
            marker: Arc::new(FailMarker::new()),
            metadata: Metadata::new(),
        }
    }

    pub fn add_node_group(&mut self, group: NodeGroup) {
        self.groups.push(group);
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    fn owner(&self) -> RouteOwner {
        RouteOwner {
            name: self.name.clone(),
            marker: self.marker.clone(),
        }
    }
}

impl Chainer for Chain {
    fn route(&self, _network: Network, address: &str) -> Route {
        let mut route = Route::new().with_owner(self.owner());

        for group in &self.groups {
            if group.bypasses(address) {
                trace!("chain {}: hop bypasses {}", self.name, address);
                break;
            }

            let Some(mut node) = group.filter_addr(address).next() else {
                return route;
            };

            // A multiplexed node carries everything selected so far inside
            // its own transport; routing continues on a fresh route.
            if node.multiplex() {
                if let Some(transport) = node.transport() {
                    let sealed = transport.with_route(route);
                    node = Arc::new(node.rebase(sealed));
                    route = Route::new();
                }
            }

            route.add_node(node);
        }
        route
    }

    fn marker(&self) -> Option<&FailMarker> {
        Some(&self.marker)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("groups", &self.groups)
            .finish()
    }
}
