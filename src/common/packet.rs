//! Datagram view over a stream session

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{Address, Stream};
use crate::error::Result;

/// Datagram-oriented connection
#[async_trait]
pub trait PacketConn: Send {
    /// Receive one datagram, returning its length and sender.
    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, Address)>;

    /// Send one datagram to `addr`.
    async fn send_to(&mut self, buf: &[u8], addr: &Address) -> Result<usize>;
}

/// A stream session bound to a single peer, presented as a packet connection.
///
/// Every read is reported as coming from the peer; the destination passed
/// to `send_to` is ignored since the session can only reach that peer.
pub struct StreamPacketConn {
    stream: Stream,
    peer: Address,
}

impl StreamPacketConn {
    pub fn new(stream: Stream, peer: Address) -> Self {
        Self { stream, peer }
    }

    pub fn peer(&self) -> &Address {
        &self.peer
    }

    pub fn into_inner(self) -> Stream {
        self.stream
    }
}

#[async_trait]
impl PacketConn for StreamPacketConn {
    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, Address)> {
        let n = self.stream.read(buf).await?;
        Ok((n, self.peer.clone()))
    }

    async fn send_to(&mut self, buf: &[u8], _addr: &Address) -> Result<usize> {
        self.stream.write_all(buf).await?;
        self.stream.flush().await?;
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_packet_conn_reports_peer() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let peer = Address::domain("dns.example", 53);
        let mut conn = StreamPacketConn::new(Box::new(local), peer.clone());

        let n = conn
            .send_to(b"query", &Address::domain("ignored", 1))
            .await
            .unwrap();
        assert_eq!(n, 5);

        let mut buf = [0u8; 16];
        let n = remote.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"query");

        remote.write_all(b"answer").await.unwrap();
        let (n, from) = conn.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"answer");
        assert_eq!(from, peer);
    }
}
