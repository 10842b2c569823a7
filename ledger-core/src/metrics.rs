//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_accounts` - Number of open accounts
//! - `ledger_funds_total` - Sum of all balances
//! - `ledger_mutations_total` - Committed mutations (create, deposit, withdraw, remove)
//! - `ledger_storage_failures_total` - Snapshot saves that failed

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::fmt;
use std::sync::Arc;

use crate::types::LedgerStats;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Open accounts
    pub accounts: IntGauge,

    /// Sum of balances
    pub funds_total: IntGauge,

    /// Committed mutations
    pub mutations_total: IntCounter,

    /// Failed snapshot saves
    pub storage_failures_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let accounts = IntGauge::new("ledger_accounts", "Number of open accounts")?;
        registry.register(Box::new(accounts.clone()))?;

        let funds_total = IntGauge::new("ledger_funds_total", "Sum of all account balances")?;
        registry.register(Box::new(funds_total.clone()))?;

        let mutations_total =
            IntCounter::new("ledger_mutations_total", "Total committed ledger mutations")?;
        registry.register(Box::new(mutations_total.clone()))?;

        let storage_failures_total = IntCounter::new(
            "ledger_storage_failures_total",
            "Total snapshot saves that failed",
        )?;
        registry.register(Box::new(storage_failures_total.clone()))?;

        Ok(Self {
            accounts,
            funds_total,
            mutations_total,
            storage_failures_total,
            registry,
        })
    }

    /// Record a committed mutation and the resulting figures
    pub fn record_mutation(&self, stats: &LedgerStats) {
        self.mutations_total.inc();
        self.update_stats(stats);
    }

    /// Update gauges
    pub fn update_stats(&self, stats: &LedgerStats) {
        self.accounts.set(stats.client_count as i64);
        self.funds_total
            .set(i64::try_from(stats.total_funds).unwrap_or(i64::MAX));
    }

    /// Record failed save
    pub fn record_storage_failure(&self) {
        self.storage_failures_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render in the Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("accounts", &self.accounts.get())
            .field("funds_total", &self.funds_total.get())
            .field("mutations_total", &self.mutations_total.get())
            .field("storage_failures_total", &self.storage_failures_total.get())
            .finish()
    }
}
