//! SOCKS5 connector (RFC 1928 client side)
//!
//! CONNECT yields the relayed stream. BIND yields a listener that accepts
//! exactly one inbound connection, reported by the server's second reply.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::common::{Address, Error, Network, Result, Stream};
use crate::transport::Listener;

use super::{Auth, BindOptions, Connector};

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const AUTH_PASSWORD: u8 = 0x02;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

const CMD_CONNECT: u8 = 0x01;
const CMD_BIND: u8 = 0x02;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REP_SUCCESS: u8 = 0x00;

fn reply_message(rep: u8) -> &'static str {
    match rep {
        0x01 => "General failure",
        0x02 => "Connection not allowed",
        0x03 => "Network unreachable",
        0x04 => "Host unreachable",
        0x05 => "Connection refused",
        0x06 => "TTL expired",
        0x07 => "Command not supported",
        0x08 => "Address type not supported",
        _ => "Unknown error",
    }
}

/// SOCKS5 connector
#[derive(Debug, Clone, Default)]
pub struct Socks5Connector {
    auth: Option<Auth>,
}

impl Socks5Connector {
    pub fn new(auth: Option<Auth>) -> Self {
        Self { auth }
    }

    async fn negotiate(&self, stream: &mut Stream) -> Result<()> {
        let method = if self.auth.is_some() {
            AUTH_PASSWORD
        } else {
            AUTH_NONE
        };
        stream.write_all(&[SOCKS5_VERSION, 1, method]).await?;

        let mut response = [0u8; 2];
        stream.read_exact(&mut response).await?;
        if response[0] != SOCKS5_VERSION {
            return Err(Error::Protocol("Invalid SOCKS version from server".into()));
        }

        match response[1] {
            AUTH_NONE => Ok(()),
            AUTH_PASSWORD => {
                let auth = self.auth.clone().unwrap_or_default();
                let mut req = vec![0x01, auth.username.len() as u8];
                req.extend_from_slice(auth.username.as_bytes());
                req.push(auth.password.len() as u8);
                req.extend_from_slice(auth.password.as_bytes());
                stream.write_all(&req).await?;

                let mut status = [0u8; 2];
                stream.read_exact(&mut status).await?;
                if status[1] != 0x00 {
                    return Err(Error::Protocol("Authentication failed".into()));
                }
                Ok(())
            }
            AUTH_NO_ACCEPTABLE => Err(Error::Protocol("Server rejected auth methods".into())),
            other => Err(Error::Protocol(format!("Unsupported auth method: {}", other))),
        }
    }

    async fn request(&self, stream: &mut Stream, cmd: u8, address: &str) -> Result<Address> {
        let target: Address = address.parse()?;
        let mut request = vec![SOCKS5_VERSION, cmd, 0x00];
        encode_address(&mut request, &target)?;
        stream.write_all(&request).await?;
        stream.flush().await?;
        read_reply(stream).await
    }
}

#[async_trait]
impl Connector for Socks5Connector {
    async fn connect(&self, mut stream: Stream, network: Network, address: &str) -> Result<Stream> {
        if !network.is_tcp() {
            return Err(Error::Unsupported(format!("socks5 connector: network {}", network)));
        }
        self.negotiate(&mut stream).await?;
        let bound = self.request(&mut stream, CMD_CONNECT, address).await?;
        debug!("socks5 connect {}: bound {}", address, bound);
        Ok(stream)
    }

    async fn bind(
        &self,
        mut stream: Stream,
        network: Network,
        address: &str,
        _opts: &BindOptions,
    ) -> Result<Box<dyn Listener>> {
        if !network.is_tcp() {
            return Err(Error::BindUnsupported(format!("socks5 {}", network)));
        }
        self.negotiate(&mut stream).await?;
        let bound = self.request(&mut stream, CMD_BIND, address).await?;
        debug!("socks5 bind {}: listening on {}", address, bound);

        Ok(Box::new(BindListener {
            stream: Mutex::new(Some(stream)),
            bound,
        }))
    }

    fn name(&self) -> &'static str {
        "socks5"
    }
}

/// Listener backed by a SOCKS5 BIND session
struct BindListener {
    stream: Mutex<Option<Stream>>,
    bound: Address,
}

#[async_trait]
impl Listener for BindListener {
    async fn accept(&self) -> Result<(Stream, Address)> {
        let mut slot = self.stream.lock().await;
        let mut stream = slot
            .take()
            .ok_or_else(|| Error::Transport("socks5 bind: listener closed".into()))?;
        let peer = read_reply(&mut stream).await?;
        Ok((stream, peer))
    }

    fn local_addr(&self) -> Result<Address> {
        Ok(self.bound.clone())
    }

    async fn close(&self) -> Result<()> {
        self.stream.lock().await.take();
        Ok(())
    }
}

fn encode_address(buf: &mut Vec<u8>, addr: &Address) -> Result<()> {
    match addr {
        Address::Socket(SocketAddr::V4(v4)) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(&v4.ip().octets());
            buf.extend_from_slice(&v4.port().to_be_bytes());
        }
        Address::Socket(SocketAddr::V6(v6)) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(&v6.ip().octets());
            buf.extend_from_slice(&v6.port().to_be_bytes());
        }
        Address::Domain(domain, port) => {
            if domain.len() > 255 {
                return Err(Error::InvalidAddress(format!("domain too long: {}", domain)));
            }
            buf.push(ATYP_DOMAIN);
            buf.push(domain.len() as u8);
            buf.extend_from_slice(domain.as_bytes());
            buf.extend_from_slice(&port.to_be_bytes());
        }
    }
    Ok(())
}

/// Read a reply and return its address field.
async fn read_reply(stream: &mut Stream) -> Result<Address> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS5_VERSION {
        return Err(Error::Protocol("Invalid SOCKS version in response".into()));
    }
    if header[1] != REP_SUCCESS {
        return Err(Error::Protocol(format!(
            "SOCKS5 error: {}",
            reply_message(header[1])
        )));
    }

    let addr = match header[3] {
        ATYP_IPV4 => {
            let mut ip = [0u8; 4];
            stream.read_exact(&mut ip).await?;
            let port = stream.read_u16().await?;
            Address::Socket(SocketAddr::new(Ipv4Addr::from(ip).into(), port))
        }
        ATYP_IPV6 => {
            let mut ip = [0u8; 16];
            stream.read_exact(&mut ip).await?;
            let port = stream.read_u16().await?;
            Address::Socket(SocketAddr::new(Ipv6Addr::from(ip).into(), port))
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut domain = vec![0u8; len];
            stream.read_exact(&mut domain).await?;
            let port = stream.read_u16().await?;
            Address::Domain(String::from_utf8_lossy(&domain).into_owned(), port)
        }
        other => {
            return Err(Error::Protocol(format!("Unsupported address type: {}", other)));
        }
    };
    Ok(addr)
}
