//! Node metrics
//!
//! - `node_connections_total` - Accepted connections
//! - `node_active_connections` - Open sessions
//! - `node_commands_total` - Request lines handled
//! - `node_command_errors_total` - Request lines answered with `ER`
//! - `node_proxied_total` - Requests forwarded to another node

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct NodeMetrics {
    /// Accepted connections
    pub connections_total: IntCounter,

    /// Open sessions
    pub active_connections: IntGauge,

    /// Handled request lines
    pub commands_total: IntCounter,

    /// `ER` responses
    pub command_errors_total: IntCounter,

    /// Forwarded requests
    pub proxied_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl NodeMetrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let connections_total =
            IntCounter::new("node_connections_total", "Total accepted connections")?;
        registry.register(Box::new(connections_total.clone()))?;

        let active_connections =
            IntGauge::new("node_active_connections", "Currently open sessions")?;
        registry.register(Box::new(active_connections.clone()))?;

        let commands_total = IntCounter::new("node_commands_total", "Total request lines handled")?;
        registry.register(Box::new(commands_total.clone()))?;

        let command_errors_total = IntCounter::new(
            "node_command_errors_total",
            "Total request lines answered with ER",
        )?;
        registry.register(Box::new(command_errors_total.clone()))?;

        let proxied_total =
            IntCounter::new("node_proxied_total", "Total requests forwarded to peers")?;
        registry.register(Box::new(proxied_total.clone()))?;

        Ok(Self {
            connections_total,
            active_connections,
            commands_total,
            command_errors_total,
            proxied_total,
            registry,
        })
    }

    /// Record one handled request
    pub fn record_command(&self, is_error: bool) {
        self.commands_total.inc();
        if is_error {
            self.command_errors_total.inc();
        }
    }

    /// Render in the Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeMetrics")
            .field("connections_total", &self.connections_total.get())
            .field("active_connections", &self.active_connections.get())
            .field("commands_total", &self.commands_total.get())
            .finish()
    }
}
