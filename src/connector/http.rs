//! HTTP CONNECT connector

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::common::{Error, Network, Result, Stream};

use super::{Auth, Connector};

/// HTTP CONNECT connector
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    auth: Option<Auth>,
}

impl HttpConnector {
    pub fn new(auth: Option<Auth>) -> Self {
        Self { auth }
    }

    fn request(&self, address: &str) -> String {
        let mut request = format!(
            "CONNECT {} HTTP/1.1\r\nHost: {}\r\nProxy-Connection: keep-alive\r\n",
            address, address
        );
        if let Some(auth) = &self.auth {
            let encoded = BASE64.encode(format!("{}:{}", auth.username, auth.password));
            request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", encoded));
        }
        request.push_str("\r\n");
        request
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, mut stream: Stream, network: Network, address: &str) -> Result<Stream> {
        if !network.is_tcp() {
            return Err(Error::Unsupported(format!("http connector: network {}", network)));
        }

        stream.write_all(self.request(address).as_bytes()).await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut status_line = String::new();
        if reader.read_line(&mut status_line).await? == 0 {
            return Err(Error::Protocol("HTTP CONNECT: connection closed".into()));
        }

        let mut parts = status_line.split_whitespace();
        let code: u16 = match (parts.next(), parts.next()) {
            (Some(version), Some(code)) if version.starts_with("HTTP/") => code
                .parse()
                .map_err(|_| Error::Protocol("Invalid status code".into()))?,
            _ => return Err(Error::Protocol("Invalid HTTP response".into())),
        };

        // Drain headers
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 || line.trim().is_empty() {
                break;
            }
        }

        if code != 200 {
            return Err(Error::Protocol(format!(
                "HTTP CONNECT {} failed: {}",
                address,
                status_line.trim()
            )));
        }
        debug!("http connect {}: {}", address, status_line.trim());

        // Keep the reader: it may already hold bytes sent by the far end.
        Ok(Box::new(reader))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    async fn read_head(server: &mut DuplexStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            server.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    #[tokio::test]
    async fn test_connect_with_auth_keeps_early_bytes() {
        let (client, mut server) = tokio::io::duplex(1024);
        let peer = tokio::spawn(async move {
            let head = read_head(&mut server).await;
            // Response and first payload bytes arrive in one write
            server
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\nhello")
                .await
                .unwrap();
            head
        });

        let connector = HttpConnector::new(Some(Auth {
            username: "user".into(),
            password: "pass".into(),
        }));
        let mut stream = connector
            .connect(Box::new(client), Network::Tcp, "example.com:443")
            .await
            .unwrap();

        let head = peer.await.unwrap();
        assert!(head.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(head.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));

        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_connect_rejected() {
        let (client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            read_head(&mut server).await;
            server
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await
                .unwrap();
        });

        let err = HttpConnector::default()
            .connect(Box::new(client), Network::Tcp, "example.com:443")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Protocol(msg) if msg.contains("407")));
    }

    #[tokio::test]
    async fn test_udp_unsupported() {
        let (client, _server) = tokio::io::duplex(64);
        let err = HttpConnector::default()
            .connect(Box::new(client), Network::Udp, "1.1.1.1:53")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
