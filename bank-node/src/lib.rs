//! Bank node
//!
//! One node of a peer-to-peer network of banks speaking a newline-delimited
//! text protocol over TCP.
//!
//! # Architecture
//!
//! ```text
//! Server ──line──▶ Dispatcher ──▶ Ledger (local accounts)
//!                      │
//!                      ├──▶ PeerClient ──▶ owning node (proxied account commands)
//!                      │
//!                      └──▶ ScanPlanner ──▶ PeerClient × N (RP)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use bank_node::{Config, Server};
//! use ledger_core::Ledger;
//!
//! #[tokio::main]
//! async fn main() -> bank_node::Result<()> {
//!     let config = Config::from_env()?;
//!     let ledger = Ledger::open(config.ledger.clone())?;
//!
//!     let server = Server::new(config, ledger.clone())?;
//!     server.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     ledger.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod scan;
pub mod server;

// Re-exports
pub use client::{PeerClient, PeerTransport};
pub use config::{Config, ScanConfig};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use metrics::NodeMetrics;
pub use protocol::{AccountTarget, Command, Request, Response};
pub use scan::{plan, PeerStat, ScanPlanner, ScanReport};
pub use server::Server;
