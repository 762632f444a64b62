//! Prometheus-based metrics module
//!
//! Collectors live in lazy statics so the routing code can touch them
//! without plumbing a handle through every call. `init_metrics` registers
//! them with the crate registry; `gather` renders the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Crate-wide Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // === Chain Metrics ===

    /// Failed attempts to reach the first hop of a chain
    pub static ref CHAIN_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("relaychain_chain_errors_total", "Total number of chain connect errors"),
        &["chain", "node"]
    ).unwrap();

    /// Time to dial and handshake the first hop of a chain
    pub static ref NODE_CONNECT_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "relaychain_node_connect_duration_seconds",
            "Time spent dialing and handshaking the first hop"
        ).buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["chain", "node"]
    ).unwrap();

    // === Router Metrics ===

    /// Route attempts made by routers (one per retry)
    pub static ref ROUTER_ATTEMPTS_TOTAL: IntCounter = IntCounter::new(
        "relaychain_router_attempts_total",
        "Total number of route attempts"
    ).unwrap();

    /// Router calls that failed after exhausting retries
    pub static ref ROUTER_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "relaychain_router_failures_total",
        "Total number of router calls that failed"
    ).unwrap();

    // === Forwarder Metrics ===

    /// Bytes relayed by forwarders, by direction
    pub static ref FORWARD_BYTES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("relaychain_forward_bytes_total", "Bytes relayed by forwarders"),
        &["forwarder", "direction"]
    ).unwrap();
}

/// Register all metrics with the crate registry
pub fn init_metrics() {
    REGISTRY.register(Box::new(CHAIN_ERRORS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(NODE_CONNECT_DURATION.clone())).ok();
    REGISTRY.register(Box::new(ROUTER_ATTEMPTS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(ROUTER_FAILURES_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(FORWARD_BYTES_TOTAL.clone())).ok();
}

/// Render registered metrics in the Prometheus text format
pub fn gather() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&REGISTRY.gather(), &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// Format bytes to human readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_gather_includes_chain_errors() {
        init_metrics();
        CHAIN_ERRORS_TOTAL
            .with_label_values(&["metrics-test", "n0"])
            .inc();
        let text = gather();
        assert!(text.contains("relaychain_chain_errors_total"));
    }
}
