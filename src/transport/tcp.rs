//! TCP dialer and local TCP listener

use std::net::SocketAddr;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

use crate::common::{Address, Network, Result, Stream};

use super::{Dialer, DialerOptions, Listener};

pub const DEFAULT_BACKLOG: u32 = 128;

/// TCP dialer - raw TCP connections
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl TcpDialer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str, opts: &DialerOptions) -> Result<Stream> {
        opts.net_dialer.dial(Network::Tcp, addr).await
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// Wrapper for TcpListener to implement Listener trait
struct TcpListenerWrapper {
    listener: TcpListener,
}

#[async_trait]
impl Listener for TcpListenerWrapper {
    async fn accept(&self) -> Result<(Stream, Address)> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((Box::new(stream), Address::Socket(addr)))
    }

    fn local_addr(&self) -> Result<Address> {
        Ok(Address::Socket(self.listener.local_addr()?))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Bind a local TCP listener with an explicit backlog (0 for the default).
pub fn listen_tcp(addr: SocketAddr, backlog: u32) -> Result<Box<dyn Listener>> {
    let backlog = if backlog == 0 { DEFAULT_BACKLOG } else { backlog };
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;

    let listener = TcpListener::from_std(std::net::TcpListener::from(socket))?;
    Ok(Box::new(TcpListenerWrapper { listener }))
}
