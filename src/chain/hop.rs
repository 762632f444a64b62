//! NodeGroup - the alternatives for one chain position

use std::sync::Arc;

use tracing::trace;

use crate::bypass::Bypass;
use crate::selector::{default_selector, Selector};

use super::Node;

/// A hop: candidate nodes plus the selector choosing among them.
#[derive(Clone)]
pub struct NodeGroup {
    nodes: Vec<Arc<Node>>,
    selector: Arc<dyn Selector<Arc<Node>>>,
    bypass: Option<Arc<dyn Bypass>>,
}

impl NodeGroup {
    /// Group with the default (round-robin) selector.
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(Arc::new).collect(),
            selector: default_selector(),
            bypass: None,
        }
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(Arc::new(node));
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn with_selector(mut self, selector: Arc<dyn Selector<Arc<Node>>>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_bypass(mut self, bypass: Arc<dyn Bypass>) -> Self {
        self.bypass = Some(bypass);
        self
    }

    /// Whether the hop-level bypass excludes `addr`.
    pub fn bypasses(&self, addr: &str) -> bool {
        self.bypass.as_ref().is_some_and(|b| b.contains(addr))
    }

    /// A new group without the nodes whose own bypass contains `addr`.
    pub fn filter_addr(&self, addr: &str) -> NodeGroup {
        NodeGroup {
            nodes: self
                .nodes
                .iter()
                .filter(|node| !node.bypasses(addr))
                .cloned()
                .collect(),
            selector: self.selector.clone(),
            bypass: self.bypass.clone(),
        }
    }

    pub fn next(&self) -> Option<Arc<Node>> {
        if self.nodes.is_empty() {
            return None;
        }
        let node = self.selector.select(&self.nodes);
        trace!(
            "select among {} node(s): {:?}",
            self.nodes.len(),
            node.as_ref().map(|n| n.name.as_str())
        );
        node
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl std::fmt::Debug for NodeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeGroup")
            .field("nodes", &self.nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>())
            .field("bypass", &self.bypass.is_some())
            .finish()
    }
}
