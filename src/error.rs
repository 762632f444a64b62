//! Error types for relaychain

use thiserror::Error;

/// Main error type for relaychain
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// A relay was required but the chain produced no hops.
    #[error("empty route")]
    EmptyRoute,

    /// The resolver reported that the name does not exist.
    #[error("resolver: domain {0} does not exist")]
    Resolve(String),

    /// The resolver cannot handle this name; callers fall back to the
    /// unresolved address.
    #[error("resolver: invalid name {0}")]
    InvalidName(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Timeout")]
    Timeout,

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("bind unsupported by connector {0}")]
    BindUnsupported(String),

    #[error("node {0} has no transport")]
    NoTransport(String),
}

/// Result type alias for relaychain
pub type Result<T> = std::result::Result<T, Error>;
