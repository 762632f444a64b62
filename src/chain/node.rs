//! Node - one addressable relay endpoint

use std::sync::Arc;

use crate::bypass::Bypass;
use crate::common::{Error, Metadata, Result};
use crate::hosts::HostMapper;
use crate::resolver::Resolver;
use crate::selector::{FailMarker, Selectable};
use crate::transport::Transport;

/// A relay endpoint.
///
/// `name` and `addr` identify the node; everything else is shared by
/// reference. Nodes are built once at configuration time and only change
/// through their fail marker or by being rebased onto another transport.
#[derive(Clone)]
pub struct Node {
    pub name: String,
    pub addr: String,
    transport: Option<Arc<Transport>>,
    bypass: Option<Arc<dyn Bypass>>,
    resolver: Option<Arc<dyn Resolver>>,
    host_mapper: Option<Arc<dyn HostMapper>>,
    marker: Arc<FailMarker>,
    metadata: Arc<Metadata>,
}

impl Node {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            transport: None,
            bypass: None,
            resolver: None,
            host_mapper: None,
            marker: Arc::new(FailMarker::new()),
            metadata: Arc::new(Metadata::new()),
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn with_bypass(mut self, bypass: Arc<dyn Bypass>) -> Self {
        self.bypass = Some(bypass);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_host_mapper(mut self, host_mapper: Arc<dyn HostMapper>) -> Self {
        self.host_mapper = Some(host_mapper);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    pub fn transport(&self) -> Option<&Transport> {
        self.transport.as_deref()
    }

    /// The transport, or `Error::NoTransport` when none is configured.
    pub(crate) fn require_transport(&self) -> Result<&Transport> {
        self.transport()
            .ok_or_else(|| Error::NoTransport(self.name.clone()))
    }

    pub fn bypass(&self) -> Option<&Arc<dyn Bypass>> {
        self.bypass.as_ref()
    }

    pub fn resolver(&self) -> Option<&Arc<dyn Resolver>> {
        self.resolver.as_ref()
    }

    pub fn host_mapper(&self) -> Option<&Arc<dyn HostMapper>> {
        self.host_mapper.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Shared handle to this node's fail marker.
    pub fn fail_marker(&self) -> &Arc<FailMarker> {
        &self.marker
    }

    /// Whether this node's own bypass excludes `addr`.
    pub fn bypasses(&self, addr: &str) -> bool {
        self.bypass.as_ref().is_some_and(|b| b.contains(addr))
    }

    /// Same identity and fail marker, different transport.
    pub fn rebase(&self, transport: Transport) -> Node {
        Node {
            transport: Some(Arc::new(transport)),
            ..self.clone()
        }
    }

    /// Whether dialing this node opens a multiplexed session.
    pub fn multiplex(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.multiplex())
    }
}

impl Selectable for Node {
    fn marker(&self) -> Option<&FailMarker> {
        Some(&self.marker)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("transport", &self.transport)
            .field("fail_count", &self.marker.count())
            .finish()
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.addr)
    }
}
