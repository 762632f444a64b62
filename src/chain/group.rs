//! ChainGroup - several chains behind one selector

use std::sync::Arc;

use crate::common::Network;
use crate::selector::{default_selector, Selector};

use super::{Chainer, Route};

pub struct ChainGroup {
    name: String,
    chains: Vec<Arc<dyn Chainer>>,
    selector: Arc<dyn Selector<Arc<dyn Chainer>>>,
}

impl ChainGroup {
    pub fn new(name: impl Into<String>, chains: Vec<Arc<dyn Chainer>>) -> Self {
        Self {
            name: name.into(),
            chains,
            selector: default_selector(),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn Selector<Arc<dyn Chainer>>>) -> Self {
        self.selector = selector;
        self
    }

    pub fn chains(&self) -> &[Arc<dyn Chainer>] {
        &self.chains
    }

    fn next(&self) -> Option<Arc<dyn Chainer>> {
        if self.chains.is_empty() {
            return None;
        }
        self.selector.select(&self.chains)
    }
}

impl Chainer for ChainGroup {
    /// Route through one selected chain; empty when none is available.
    fn route(&self, network: Network, address: &str) -> Route {
        match self.next() {
            Some(chain) => chain.route(network, address),
            None => Route::new(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
