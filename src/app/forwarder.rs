//! Forwarder - local port forwarding through the router
//!
//! ```text
//! client ─► listen ─► Router.dial(target) ─► chain ─► target
//!                  ◄──────── bidirectional relay ────────►
//! ```
//!
//! Each accepted connection is handled in its own tokio task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::common::{Address, Network, Stream};
use crate::error::{Error, Result};
use crate::metrics::{format_bytes, FORWARD_BYTES_TOTAL};
use crate::router::Router;
use crate::transport::{listen_tcp, Listener};

/// Relay buffer size (32KB)
const RELAY_BUFFER_SIZE: usize = 32 * 1024;

pub struct Forwarder {
    name: String,
    listen: String,
    target: String,
    router: Arc<Router>,
}

impl Forwarder {
    pub fn new(
        name: impl Into<String>,
        listen: impl Into<String>,
        target: impl Into<String>,
        router: Arc<Router>,
    ) -> Self {
        Self {
            name: name.into(),
            listen: listen.into(),
            target: target.into(),
            router,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Open the local listener.
    pub fn bind(&self) -> Result<Box<dyn Listener>> {
        let addr: SocketAddr = self
            .listen
            .parse()
            .map_err(|_| Error::Config(format!("invalid listen address: {}", self.listen)))?;
        listen_tcp(addr, 0)
    }

    /// Bind and accept until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: broadcast::Receiver<()>) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener, shutdown).await
    }

    /// Accept on an already bound listener until `shutdown` fires.
    pub async fn serve(
        self: Arc<Self>,
        listener: Box<dyn Listener>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!(
            "[{}] Listening on {}, forwarding to {}",
            self.name,
            listener.local_addr()?,
            self.target
        );

        let mut conn_count: u64 = 0;
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, source)) => {
                            conn_count += 1;
                            let conn_id = conn_count;
                            debug!("[{}] New connection #{} from {}", self.name, conn_id, source);

                            let this = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = this.handle(stream, &source).await {
                                    warn!("[{}] Connection #{} from {} error: {}", this.name, conn_id, source, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("[{}] Accept error: {}", self.name, e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("[{}] Shutting down (handled {} connections)", self.name, conn_count);
                    break;
                }
            }
        }

        listener.close().await
    }

    async fn handle(&self, inbound: Stream, source: &Address) -> Result<()> {
        let start = Instant::now();
        let outbound = self.router.dial(Network::Tcp, &self.target).await?;
        info!("[{}] {} -> {}", self.name, source, self.target);

        let (up, down) = relay(&self.name, inbound, outbound).await;
        info!(
            "[{}] Closed: {} -> {} (↑{} ↓{} {:?})",
            self.name,
            source,
            self.target,
            format_bytes(up),
            format_bytes(down),
            start.elapsed()
        );
        Ok(())
    }
}

/// Copy both directions until each side reaches EOF; returns
/// (client → target, target → client) byte counts.
pub async fn relay(name: &str, inbound: Stream, outbound: Stream) -> (u64, u64) {
    let (in_read, in_write) = tokio::io::split(inbound);
    let (out_read, out_write) = tokio::io::split(outbound);

    let upload = copy_counted(in_read, out_write, name, "up");
    let download = copy_counted(out_read, in_write, name, "down");
    tokio::join!(upload, download)
}

async fn copy_counted<R, W>(mut reader: R, mut writer: W, name: &str, direction: &str) -> u64
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let counter = FORWARD_BYTES_TOTAL.with_label_values(&[name, direction]);
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };

        if writer.write_all(&buf[..n]).await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }

        total += n as u64;
        counter.inc_by(n as u64);
    }

    let _ = writer.shutdown().await;
    total
}
