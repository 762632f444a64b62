//! Forward connector - the node itself is the destination

use async_trait::async_trait;
use tracing::trace;

use crate::common::{Network, Result, Stream};

use super::Connector;

/// Passthrough connector.
///
/// Used for port forwarding: the dialed stream already leads where traffic
/// should go, so no relay request is sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardConnector;

#[async_trait]
impl Connector for ForwardConnector {
    async fn connect(&self, stream: Stream, network: Network, address: &str) -> Result<Stream> {
        trace!("forward {}/{}: passthrough", address, network);
        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "forward"
    }
}
