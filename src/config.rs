//! Configuration module for relaychain
//!
//! JSON configuration: chains of hops, router options, name resolution
//! and local forwarders. Dialers and connectors are referenced by name and
//! turned into trait objects through a `Registry`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::bypass::AddrBypass;
use crate::chain::{Chain, ChainGroup, Chainer, Node, NodeGroup};
use crate::common::Metadata;
use crate::connector::Auth;
use crate::error::{Error, Result};
use crate::hosts::{HostMapper, StaticHosts};
use crate::recorder::{FileRecorder, RecordEvent, RecorderObject};
use crate::registry::Registry;
use crate::resolver::{Resolver, SystemResolver};
use crate::router::{Router, RouterOptions};
use crate::selector::SelectorConfig;
use crate::transport::{SockOpts, TlsConfig, Transport, TransportOptions};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub router: RouterConfig,

    /// Resolver used by the router: "system" or absent
    #[serde(default)]
    pub resolver: Option<String>,

    /// Static host table consulted before the resolver
    #[serde(default)]
    pub hosts: HashMap<String, Vec<IpAddr>>,

    #[serde(default)]
    pub chains: Vec<ChainConfig>,

    #[serde(default)]
    pub recorders: Vec<RecorderConfig>,

    #[serde(default)]
    pub forwarders: Vec<ForwarderConfig>,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// A two-hop sample: TLS to an HTTP proxy, then a SOCKS5 proxy
    pub fn example() -> Self {
        Config {
            log: LogConfig::default(),
            router: RouterConfig {
                retries: 2,
                timeout_secs: 15,
                chains: vec!["main".to_string()],
                ..Default::default()
            },
            resolver: Some("system".to_string()),
            hosts: HashMap::new(),
            chains: vec![ChainConfig {
                name: "main".to_string(),
                hops: vec![
                    HopConfig {
                        name: "edge".to_string(),
                        selector: SelectorConfig {
                            max_fails: 1,
                            fail_timeout_secs: 30,
                            ..Default::default()
                        },
                        bypass: vec!["127.0.0.1".to_string(), "localhost".to_string()],
                        bypass_whitelist: false,
                        nodes: vec![
                            NodeConfig {
                                name: "edge-1".to_string(),
                                addr: "proxy1.example.com:443".to_string(),
                                dialer: DialerConfig {
                                    kind: "tls".to_string(),
                                    tls: Some(TlsConfig::default()),
                                },
                                connector: ConnectorConfig {
                                    kind: "http".to_string(),
                                    auth: Some(Auth {
                                        username: "user".to_string(),
                                        password: "pass".to_string(),
                                    }),
                                },
                                ..Default::default()
                            },
                            NodeConfig {
                                name: "edge-2".to_string(),
                                addr: "proxy2.example.com:443".to_string(),
                                dialer: DialerConfig {
                                    kind: "tls".to_string(),
                                    tls: Some(TlsConfig::default()),
                                },
                                connector: ConnectorConfig {
                                    kind: "http".to_string(),
                                    auth: None,
                                },
                                ..Default::default()
                            },
                        ],
                    },
                    HopConfig {
                        name: "exit".to_string(),
                        selector: SelectorConfig::default(),
                        bypass: vec![],
                        bypass_whitelist: false,
                        nodes: vec![NodeConfig {
                            name: "exit-1".to_string(),
                            addr: "10.0.0.2:1080".to_string(),
                            connector: ConnectorConfig {
                                kind: "socks5".to_string(),
                                auth: None,
                            },
                            bypass: vec!["10.0.0.0/8".to_string()],
                            ..Default::default()
                        }],
                    },
                ],
                metadata: HashMap::new(),
            }],
            recorders: vec![],
            forwarders: vec![ForwarderConfig {
                name: "ssh".to_string(),
                listen: "127.0.0.1:2222".to_string(),
                target: "internal.example.com:22".to_string(),
            }],
        }
    }

    /// Build every configured chain, keyed by name.
    pub fn build_chains(&self, registry: &Registry) -> Result<HashMap<String, Arc<Chain>>> {
        let mut chains = HashMap::new();
        for cfg in &self.chains {
            let chain = cfg.build(registry)?;
            if chains.insert(cfg.name.clone(), Arc::new(chain)).is_some() {
                return Err(Error::Config(format!("duplicate chain: {}", cfg.name)));
            }
        }
        Ok(chains)
    }

    /// Build the router with its chain (or chain group), resolver, hosts
    /// and recorders.
    pub fn build_router(&self, registry: &Registry) -> Result<Router> {
        let mut chains = self.build_chains(registry)?;

        let mut selected: Vec<Arc<dyn Chainer>> = Vec::new();
        for name in &self.router.chains {
            let chain = chains
                .remove(name)
                .ok_or_else(|| Error::Config(format!("unknown chain: {}", name)))?;
            selected.push(chain);
        }
        let chain: Option<Arc<dyn Chainer>> = match selected.len() {
            0 => None,
            1 => selected.pop(),
            _ => Some(Arc::new(
                ChainGroup::new("router", selected).with_selector(self.router.selector.build()),
            )),
        };

        let resolver = match self.resolver.as_deref() {
            None | Some("") => None,
            Some("system") => Some(Arc::new(SystemResolver) as Arc<dyn Resolver>),
            Some(other) => return Err(Error::Config(format!("unknown resolver: {}", other))),
        };

        let hosts = if self.hosts.is_empty() {
            None
        } else {
            let mut table = StaticHosts::new();
            for (host, ips) in &self.hosts {
                table.insert(host, ips.clone());
            }
            Some(Arc::new(table) as Arc<dyn HostMapper>)
        };

        let recorders = self
            .recorders
            .iter()
            .map(RecorderConfig::build)
            .collect::<Result<Vec<_>>>()?;

        Ok(Router::new(RouterOptions {
            retries: self.router.retries,
            timeout: secs(self.router.timeout_secs),
            interface: self.router.interface.clone(),
            netns: self.router.netns.clone(),
            sock_opts: sock_opts(self.router.mark),
            chain,
            resolver,
            hosts,
            recorders,
        }))
    }
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Router options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Extra attempts after the first
    pub retries: usize,
    /// Per-attempt timeout, 0 for none
    pub timeout_secs: u64,
    /// Outgoing interface for direct dials
    pub interface: Option<String>,
    /// Network namespace for direct dials
    pub netns: Option<String>,
    /// SO_MARK for direct dials, 0 for none
    pub mark: u32,
    /// Chains to route through; several are grouped behind `selector`
    pub chains: Vec<String>,
    pub selector: SelectorConfig,
}

/// One chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    #[serde(default)]
    pub hops: Vec<HopConfig>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ChainConfig {
    pub fn build(&self, registry: &Registry) -> Result<Chain> {
        let groups = self
            .hops
            .iter()
            .map(|hop| hop.build(registry))
            .collect::<Result<Vec<_>>>()?;
        Ok(Chain::new(&self.name, groups).with_metadata(metadata(&self.metadata)))
    }
}

/// One hop: candidate nodes behind a selector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub selector: SelectorConfig,
    /// Destinations that stop the chain before this hop
    #[serde(default)]
    pub bypass: Vec<String>,
    #[serde(default)]
    pub bypass_whitelist: bool,
    pub nodes: Vec<NodeConfig>,
}

impl HopConfig {
    pub fn build(&self, registry: &Registry) -> Result<NodeGroup> {
        if self.nodes.is_empty() {
            return Err(Error::Config(format!("hop {} has no nodes", self.name)));
        }
        let nodes = self
            .nodes
            .iter()
            .map(|node| node.build(registry))
            .collect::<Result<Vec<_>>>()?;

        let mut group = NodeGroup::new(nodes).with_selector(self.selector.build());
        if !self.bypass.is_empty() {
            group = group.with_bypass(Arc::new(
                AddrBypass::new(&self.bypass).whitelist(self.bypass_whitelist),
            ));
        }
        Ok(group)
    }
}

/// One proxy node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub name: String,
    /// `host:port` of the proxy
    pub addr: String,
    pub dialer: DialerConfig,
    pub connector: ConnectorConfig,
    /// Destinations this node must not carry
    pub bypass: Vec<String>,
    pub bypass_whitelist: bool,
    /// Interface (or local IP list) used when this node is dialed directly
    pub interface: Option<String>,
    pub netns: Option<String>,
    pub mark: u32,
    /// Dial timeout, 0 for the default
    pub timeout_secs: u64,
    pub metadata: HashMap<String, String>,
}

impl NodeConfig {
    pub fn build(&self, registry: &Registry) -> Result<Node> {
        if self.addr.is_empty() {
            return Err(Error::Config(format!("node {} has no address", self.name)));
        }
        let name = if self.name.is_empty() {
            self.addr.clone()
        } else {
            self.name.clone()
        };

        let transport = Transport::new(registry.dialer(&self.dialer)?, registry.connector(&self.connector)?)
            .with_options(TransportOptions {
                addr: self.addr.clone(),
                interface: self.interface.clone(),
                netns: self.netns.clone(),
                sock_opts: sock_opts(self.mark),
                route: None,
                timeout: secs(self.timeout_secs),
            });

        let mut node = Node::new(name, &self.addr)
            .with_transport(transport)
            .with_metadata(metadata(&self.metadata));
        if !self.bypass.is_empty() {
            node = node.with_bypass(Arc::new(
                AddrBypass::new(&self.bypass).whitelist(self.bypass_whitelist),
            ));
        }
        Ok(node)
    }
}

/// Dialer reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialerConfig {
    #[serde(rename = "type", default = "default_dialer")]
    pub kind: String,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

fn default_dialer() -> String {
    "tcp".to_string()
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            kind: default_dialer(),
            tls: None,
        }
    }
}

/// Connector reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(rename = "type", default = "default_connector")]
    pub kind: String,
    #[serde(default)]
    pub auth: Option<Auth>,
}

fn default_connector() -> String {
    "http".to_string()
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            kind: default_connector(),
            auth: None,
        }
    }
}

/// Appends one event's records to a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// "dial" or "dial_error"
    pub event: String,
    pub file: String,
}

impl RecorderConfig {
    pub fn build(&self) -> Result<RecorderObject> {
        let event = match self.event.as_str() {
            "dial" => RecordEvent::DialAddress,
            "dial_error" => RecordEvent::DialAddressError,
            other => return Err(Error::Config(format!("unknown record event: {}", other))),
        };
        Ok(RecorderObject::new(event, Arc::new(FileRecorder::new(&self.file))))
    }
}

/// Local TCP listener relaying every connection to a fixed target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    #[serde(default)]
    pub name: String,
    pub listen: String,
    pub target: String,
}

fn secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn sock_opts(mark: u32) -> Option<SockOpts> {
    (mark != 0).then_some(SockOpts { mark })
}

fn metadata(values: &HashMap<String, String>) -> Metadata {
    Metadata::from(values.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Network;

    #[test]
    fn test_example_config() {
        let config = Config::example();
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].hops.len(), 2);
        assert_eq!(config.forwarders.len(), 1);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::example();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed = Config::from_json(&json).unwrap();
        assert_eq!(parsed.chains[0].hops[0].nodes.len(), 2);
        assert_eq!(parsed.chains[0].hops[0].nodes[0].dialer.kind, "tls");
        assert_eq!(parsed.router.chains, vec!["main"]);
    }

    #[test]
    fn test_minimal_json_defaults() {
        let config = Config::from_json(
            r#"{
                "chains": [{
                    "name": "c",
                    "hops": [{ "nodes": [{ "addr": "10.0.0.1:8080" }] }]
                }],
                "router": { "chains": ["c"] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.log.level, "info");
        let node = &config.chains[0].hops[0].nodes[0];
        assert_eq!(node.dialer.kind, "tcp");
        assert_eq!(node.connector.kind, "http");
        assert_eq!(config.router.retries, 0);
    }

    #[test]
    fn test_build_router() {
        let config = Config::example();
        let router = config.build_router(&Registry::with_defaults()).unwrap();
        let options = router.options();
        assert_eq!(options.retries, 2);
        assert_eq!(options.timeout, Some(Duration::from_secs(15)));
        assert!(options.resolver.is_some());
        assert!(options.hosts.is_none());

        let chain = options.chain.as_ref().unwrap();
        assert_eq!(chain.name(), "main");
        let route = chain.route(Network::Tcp, "example.org:443");
        assert_eq!(route.len(), 2);
        assert_eq!(route.nodes()[1].name, "exit-1");

        // the exit node refuses private destinations
        let route = chain.route(Network::Tcp, "10.1.2.3:22");
        assert_eq!(route.len(), 1);

        // the first hop is bypassed for loopback
        assert!(chain.route(Network::Tcp, "127.0.0.1:80").is_empty());
    }

    #[test]
    fn test_build_chain_group() {
        let mut config = Config::example();
        let mut second = config.chains[0].clone();
        second.name = "backup".to_string();
        config.chains.push(second);
        config.router.chains = vec!["main".to_string(), "backup".to_string()];

        let router = config.build_router(&Registry::with_defaults()).unwrap();
        assert_eq!(router.options().chain.as_ref().unwrap().name(), "router");
    }

    #[test]
    fn test_build_errors() {
        let registry = Registry::with_defaults();

        let mut config = Config::example();
        config.router.chains = vec!["missing".to_string()];
        assert!(matches!(config.build_router(&registry), Err(Error::Config(_))));

        let mut config = Config::example();
        config.chains[0].hops[1].nodes[0].connector.kind = "vless".to_string();
        assert!(matches!(config.build_router(&registry), Err(Error::Config(_))));

        let mut config = Config::example();
        config.chains[0].hops[1].nodes.clear();
        assert!(matches!(config.build_router(&registry), Err(Error::Config(_))));

        let mut config = Config::example();
        config.resolver = Some("doh".to_string());
        assert!(matches!(config.build_router(&registry), Err(Error::Config(_))));

        let mut config = Config::example();
        config.chains.push(config.chains[0].clone());
        assert!(matches!(config.build_router(&registry), Err(Error::Config(_))));
    }

    #[test]
    fn test_hosts_and_recorders() {
        let mut config = Config::example();
        config
            .hosts
            .insert("db.internal".to_string(), vec!["10.0.0.9".parse().unwrap()]);
        config.recorders.push(RecorderConfig {
            event: "dial".to_string(),
            file: "/tmp/relaychain-dial.log".to_string(),
        });
        let router = config.build_router(&Registry::with_defaults()).unwrap();
        assert!(router.hosts().is_some());
        assert_eq!(router.options().recorders.len(), 1);
        assert_eq!(router.options().recorders[0].event, RecordEvent::DialAddress);

        config.recorders[0].event = "accept".to_string();
        assert!(config.build_router(&Registry::with_defaults()).is_err());
    }
}
