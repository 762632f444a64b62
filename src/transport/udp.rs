//! UDP sockets as streams
//!
//! UDP is connectionless. A connected socket is exposed as a stream where
//! each read returns (part of) one datagram and each write sends one.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;

use crate::common::{Address, Result, Stream};

use super::Listener;

const DEFAULT_READ_BUFFER_SIZE: usize = 65535;

/// Connected UDP socket implementing AsyncRead + AsyncWrite
pub struct UdpStream {
    socket: UdpSocket,
    read_buf: Vec<u8>,
    read_pos: usize,
    read_len: usize,
}

impl UdpStream {
    /// `buffer_size` of 0 selects the default (one maximal datagram).
    pub fn new(socket: UdpSocket, buffer_size: usize) -> Self {
        let size = if buffer_size == 0 {
            DEFAULT_READ_BUFFER_SIZE
        } else {
            buffer_size
        };
        Self {
            socket,
            read_buf: vec![0u8; size],
            read_pos: 0,
            read_len: 0,
        }
    }

    /// Serve `data` as the first read, before anything from the socket.
    pub fn with_pending(mut self, data: &[u8]) -> Self {
        let len = data.len().min(self.read_buf.len());
        self.read_buf[..len].copy_from_slice(&data[..len]);
        self.read_pos = 0;
        self.read_len = len;
        self
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.peer_addr()?)
    }
}

impl AsyncRead for UdpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.read_pos < self.read_len {
            let remaining = self.read_len - self.read_pos;
            let to_copy = remaining.min(buf.remaining());
            buf.put_slice(&self.read_buf[self.read_pos..self.read_pos + to_copy]);
            self.read_pos += to_copy;
            return Poll::Ready(Ok(()));
        }

        let this = self.get_mut();
        let mut recv_buf = ReadBuf::new(&mut this.read_buf);
        match this.socket.poll_recv(cx, &mut recv_buf) {
            Poll::Ready(Ok(())) => {
                this.read_len = recv_buf.filled().len();
                let to_copy = this.read_len.min(buf.remaining());
                buf.put_slice(&this.read_buf[..to_copy]);
                this.read_pos = to_copy;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncWrite for UdpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.socket.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Local UDP listener.
///
/// `accept` takes the next datagram and returns a socket sharing the
/// listening port, connected to its sender. That datagram is replayed as the
/// first read of the accepted stream; later datagrams from the same sender
/// go to the connected socket. There is no per-peer demultiplexing beyond
/// what the kernel does for connected sockets.
struct UdpListener {
    socket: UdpSocket,
    buffer_size: usize,
}

#[async_trait]
impl Listener for UdpListener {
    async fn accept(&self) -> Result<(Stream, Address)> {
        let mut buf = vec![0u8; self.buffer_size];
        let (n, peer) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(n);

        let conn = reusable_socket(self.socket.local_addr()?)?;
        conn.connect(peer).await?;

        let stream = UdpStream::new(conn, self.buffer_size).with_pending(&buf);
        Ok((Box::new(stream), Address::Socket(peer)))
    }

    fn local_addr(&self) -> Result<Address> {
        Ok(Address::Socket(self.socket.local_addr()?))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn reusable_socket(addr: SocketAddr) -> Result<UdpSocket> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Bind a local UDP listener. `buffer_size` sizes each accepted stream's
/// read buffer (0 for the default).
pub async fn listen_udp(addr: SocketAddr, buffer_size: usize) -> Result<Box<dyn Listener>> {
    let buffer_size = if buffer_size == 0 {
        DEFAULT_READ_BUFFER_SIZE
    } else {
        buffer_size
    };
    Ok(Box::new(UdpListener {
        socket: reusable_socket(addr)?,
        buffer_size,
    }))
}
