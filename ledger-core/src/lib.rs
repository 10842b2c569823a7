//! Bank node ledger core
//!
//! Authoritative account balances for one node, backed by a redundant JSON
//! snapshot.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task owns the account map; every request is a message
//! - **Snapshot Persistence**: Whole-map save after each mutation, primary + rotated backup
//! - **Observers**: Totals are broadcast on a channel, off the writer's critical path

#![forbid(unsafe_code)]
//!
//! # Invariants
//!
//! - Balances never go below zero
//! - Only empty accounts can be removed
//! - A successful mutation has been handed to storage before the caller sees `Ok`
//! - A failed save never destroys the previously persisted snapshot

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{AccountId, AccountMap, LedgerNotification, LedgerStats};
pub use storage::SnapshotStore;
pub use ledger::{Ledger, LedgerObserver};
pub use metrics::Metrics;
pub use config::Config;
