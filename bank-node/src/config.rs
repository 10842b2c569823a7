//! Configuration for the bank node

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Address this node reports in `BC`/`AC` and answers to
    pub address: String,

    /// Interface to bind
    pub bind_host: String,

    /// Listening port, also used to reach peers
    pub port: u16,

    /// Timeout for every outbound call (milliseconds)
    pub network_timeout_ms: u64,

    /// Close sessions idle for this long (seconds)
    pub session_idle_timeout_secs: u64,

    /// Longest accepted request line (bytes)
    pub max_line_length: usize,

    /// Explicit `RP` scan targets; empty means sweep the local /24
    pub peers: Vec<String>,

    /// Scan configuration
    pub scan: ScanConfig,

    /// Ledger configuration
    pub ledger: ledger_core::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "bank-node".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            address: detect_local_address().to_string(),
            bind_host: "0.0.0.0".to_string(),
            port: 65530,
            network_timeout_ms: 5000,
            session_idle_timeout_secs: 300,
            max_line_length: 4096,
            peers: Vec::new(),
            scan: ScanConfig::default(),
            ledger: ledger_core::Config::default(),
        }
    }
}

/// Network scan (`RP`) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Peers queried at the same time
    pub parallelism: usize,

    /// Budget for one peer's `BA` + `BN` pair (milliseconds)
    pub peer_timeout_ms: u64,

    /// Budget for the whole scan (milliseconds)
    pub deadline_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            parallelism: 64,
            peer_timeout_ms: 1000,
            deadline_ms: 15_000,
        }
    }
}

impl ScanConfig {
    /// Per-peer timeout
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    /// Whole-scan deadline
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        Config::default().with_env_overrides()
    }

    /// Apply `BANK_NODE_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(address) = std::env::var("BANK_NODE_ADDRESS") {
            self.address = address;
        }

        if let Ok(port) = std::env::var("BANK_NODE_PORT") {
            self.port = port
                .parse()
                .map_err(|_| Error::Config(format!("BANK_NODE_PORT is not a port: {}", port)))?;
        }

        if let Ok(timeout) = std::env::var("BANK_NODE_TIMEOUT_MS") {
            self.network_timeout_ms = timeout.parse().map_err(|_| {
                Error::Config(format!("BANK_NODE_TIMEOUT_MS is not a number: {}", timeout))
            })?;
        }

        if let Ok(peers) = std::env::var("BANK_NODE_PEERS") {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(data_dir) = std::env::var("BANK_NODE_DATA_DIR") {
            self.ledger.data_dir = PathBuf::from(data_dir);
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::Config("address must not be empty".to_string()));
        }
        if self.network_timeout_ms == 0 {
            return Err(Error::Config("network_timeout_ms must be positive".to_string()));
        }
        if self.max_line_length == 0 {
            return Err(Error::Config("max_line_length must be positive".to_string()));
        }
        if self.scan.parallelism == 0 {
            return Err(Error::Config("scan.parallelism must be positive".to_string()));
        }
        Ok(())
    }

    /// Outbound call timeout
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    /// Session idle timeout
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// Listening socket address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// Best guess at this host's LAN IPv4 address
///
/// Connecting a UDP socket sends nothing; it only asks the OS which local
/// interface would route to a public address.
pub fn detect_local_address() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .ok()
        .filter(|ip| !ip.is_unspecified())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
