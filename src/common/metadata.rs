//! Network kinds and opaque node/chain metadata

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// Network type requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Network {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
    Unix,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Udp => "udp",
            Network::Udp4 => "udp4",
            Network::Udp6 => "udp6",
            Network::Unix => "unix",
        }
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, Network::Tcp | Network::Tcp4 | Network::Tcp6)
    }

    pub fn is_udp(&self) -> bool {
        matches!(self, Network::Udp | Network::Udp4 | Network::Udp6)
    }

    /// Address family name handed to resolvers ("ip", "ip4" or "ip6").
    pub fn ip_family(&self) -> &'static str {
        match self {
            Network::Tcp4 | Network::Udp4 => "ip4",
            Network::Tcp6 | Network::Udp6 => "ip6",
            _ => "ip",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            "udp" => Ok(Network::Udp),
            "udp4" => Ok(Network::Udp4),
            "udp6" => Ok(Network::Udp6),
            "unix" => Ok(Network::Unix),
            other => Err(Error::Unsupported(format!("network {}", other))),
        }
    }
}

/// Opaque key/value metadata carried by nodes and chains.
///
/// Keys are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    values: HashMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a value
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.values
            .insert(key.as_ref().to_lowercase(), value.into());
    }

    pub fn is_exists(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_lowercase())
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(
            self.get_string(key).map(str::to_lowercase).as_deref(),
            Some("true" | "1" | "yes" | "on")
        )
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get_string(key).and_then(|v| v.trim().parse().ok())
    }

    /// Durations are either plain seconds ("30") or suffixed ("500ms", "10s", "2m").
    pub fn get_duration(&self, key: &str) -> Option<Duration> {
        parse_duration(self.get_string(key)?)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<HashMap<String, String>> for Metadata {
    fn from(map: HashMap<String, String>) -> Self {
        let mut md = Metadata::new();
        for (k, v) in map {
            md.set(k, v);
        }
        md
    }
}

fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.trim().parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.trim().parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60));
    }
    s.parse().ok().map(Duration::from_secs)
}
