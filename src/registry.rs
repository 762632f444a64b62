//! Registry - name -> constructor maps for dialers and connectors
//!
//! Configuration refers to dialers and connectors by name. A `Registry` is
//! owned by whoever builds the chains and can be extended before use; there
//! is no global instance.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ConnectorConfig, DialerConfig};
use crate::connector::{Connector, ForwardConnector, HttpConnector, Socks5Connector};
use crate::error::{Error, Result};
use crate::transport::{Dialer, TcpDialer, TlsDialer};

pub type DialerFactory = fn(&DialerConfig) -> Result<Arc<dyn Dialer>>;
pub type ConnectorFactory = fn(&ConnectorConfig) -> Result<Arc<dyn Connector>>;

#[derive(Clone)]
pub struct Registry {
    dialers: HashMap<String, DialerFactory>,
    connectors: HashMap<String, ConnectorFactory>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            dialers: HashMap::new(),
            connectors: HashMap::new(),
        }
    }

    /// Registry with the built-in dialers (`tcp`, `tls`) and connectors
    /// (`forward`, `http`, `socks5`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_dialer("tcp", |_| Ok(Arc::new(TcpDialer::new())));
        registry.register_dialer("tls", |cfg| {
            Ok(Arc::new(TlsDialer::new(cfg.tls.clone().unwrap_or_default())?))
        });
        registry.register_connector("forward", |_| Ok(Arc::new(ForwardConnector)));
        registry.register_connector("http", |cfg| Ok(Arc::new(HttpConnector::new(cfg.auth.clone()))));
        registry.register_connector("socks5", |cfg| {
            Ok(Arc::new(Socks5Connector::new(cfg.auth.clone())))
        });
        registry
    }

    pub fn register_dialer(&mut self, name: impl Into<String>, factory: DialerFactory) {
        self.dialers.insert(name.into().to_lowercase(), factory);
    }

    pub fn register_connector(&mut self, name: impl Into<String>, factory: ConnectorFactory) {
        self.connectors.insert(name.into().to_lowercase(), factory);
    }

    pub fn dialer(&self, cfg: &DialerConfig) -> Result<Arc<dyn Dialer>> {
        let factory = self
            .dialers
            .get(&cfg.kind.to_lowercase())
            .ok_or_else(|| Error::Config(format!("unknown dialer: {}", cfg.kind)))?;
        factory(cfg)
    }

    pub fn connector(&self, cfg: &ConnectorConfig) -> Result<Arc<dyn Connector>> {
        let factory = self
            .connectors
            .get(&cfg.kind.to_lowercase())
            .ok_or_else(|| Error::Config(format!("unknown connector: {}", cfg.kind)))?;
        factory(cfg)
    }

    pub fn dialer_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn connector_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
