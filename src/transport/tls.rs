//! TLS dialer
//!
//! Dials over TCP, then runs the client handshake in `Dialer::handshake`.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::common::{split_host_port, BoxedStream, Error, Network, Result, Stream};

use super::{Dialer, DialerOptions};

/// TLS client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Server name for SNI; defaults to the node's host
    pub server_name: Option<String>,
    /// Skip certificate verification
    pub allow_insecure: bool,
    /// ALPN protocols
    pub alpn: Vec<String>,
    /// Extra CA bundle (PEM) trusted in addition to the web roots
    pub ca_file: Option<String>,
}

pub struct TlsDialer {
    config: TlsConfig,
    connector: TlsConnector,
}

impl TlsDialer {
    pub fn new(config: TlsConfig) -> Result<Self> {
        let connector = Self::build_connector(&config)?;
        Ok(Self { config, connector })
    }

    fn build_connector(config: &TlsConfig) -> Result<TlsConnector> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        if let Some(path) = &config.ca_file {
            for cert in Self::load_certs(path)? {
                root_store
                    .add(cert)
                    .map_err(|e| Error::Config(format!("Invalid CA certificate in {}: {}", path, e)))?;
            }
        }

        let mut tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if !config.alpn.is_empty() {
            tls_config.alpn_protocols = config
                .alpn
                .iter()
                .map(|s| s.as_bytes().to_vec())
                .collect();
        }

        if config.allow_insecure {
            tls_config
                .dangerous()
                .set_certificate_verifier(Arc::new(InsecureVerifier));
        }

        Ok(TlsConnector::from(Arc::new(tls_config)))
    }

    fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
        let file = File::open(path)
            .map_err(|e| Error::Config(format!("Failed to open certificate file {}: {}", path, e)))?;
        let mut reader = BufReader::new(file);
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Config(format!("Failed to parse certificates: {}", e)))?;
        Ok(certs)
    }

    /// SNI: explicit server name, else the host part of the node address.
    fn server_name(&self, opts: &DialerOptions) -> Result<ServerName<'static>> {
        let name = match &self.config.server_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => split_host_port(&opts.host)
                .map(|(host, _)| host)
                .unwrap_or(opts.host.as_str())
                .to_string(),
        };
        if name.is_empty() {
            return Err(Error::Config("TLS server name required".into()));
        }
        ServerName::try_from(name.clone())
            .map_err(|_| Error::Config(format!("Invalid server name: {}", name)))
    }
}

#[async_trait]
impl Dialer for TlsDialer {
    async fn dial(&self, addr: &str, opts: &DialerOptions) -> Result<Stream> {
        opts.net_dialer.dial(Network::Tcp, addr).await
    }

    async fn handshake(&self, stream: Stream, opts: &DialerOptions) -> Result<Stream> {
        let domain = self.server_name(opts)?;
        let tls_stream = self.connector.connect(domain, BoxedStream(stream)).await?;
        Ok(Box::new(tls_stream))
    }

    fn name(&self) -> &'static str {
        "tls"
    }
}

/// Certificate verifier that accepts anything
#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dns_name(name: &ServerName<'_>) -> String {
        match name {
            ServerName::DnsName(d) => d.as_ref().to_string(),
            other => panic!("unexpected server name {:?}", other),
        }
    }

    fn opts(host: &str) -> DialerOptions {
        DialerOptions {
            host: host.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_server_name_from_host() {
        let dialer = TlsDialer::new(TlsConfig::default()).unwrap();
        let name = dialer.server_name(&opts("relay.example.com:443")).unwrap();
        assert_eq!(dns_name(&name), "relay.example.com");
    }

    #[test]
    fn test_explicit_server_name_wins() {
        let dialer = TlsDialer::new(TlsConfig {
            server_name: Some("sni.example.org".into()),
            ..Default::default()
        })
        .unwrap();
        let name = dialer.server_name(&opts("10.0.0.1:443")).unwrap();
        assert_eq!(dns_name(&name), "sni.example.org");
    }

    #[test]
    fn test_missing_ca_file() {
        let err = TlsDialer::new(TlsConfig {
            ca_file: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
