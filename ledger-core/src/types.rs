//! Core types for the ledger
//!
//! Balances are whole numbers in the smallest currency unit. The snapshot
//! map is ordered so that its JSON form is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Lowest generated account number
pub const MIN_ACCOUNT_ID: u32 = 10_000;

/// Highest generated account number
pub const MAX_ACCOUNT_ID: u32 = 99_999;

/// Account identifier, unique within one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(u32);

impl AccountId {
    /// Create new account ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw account number
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(AccountId)
    }
}

impl From<u32> for AccountId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Complete account map: the unit of persistence
pub type AccountMap = BTreeMap<AccountId, u64>;

/// Aggregate figures broadcast to observers after every mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Sum of all balances
    pub total_funds: u64,

    /// Number of accounts
    pub client_count: usize,
}

impl LedgerStats {
    /// Compute stats over an account map
    pub fn from_accounts(accounts: &AccountMap) -> Self {
        Self {
            total_funds: accounts
                .values()
                .fold(0u64, |sum, balance| sum.saturating_add(*balance)),
            client_count: accounts.len(),
        }
    }
}

/// Payload carried on the notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerNotification {
    /// Ledger figures changed
    Stats(LedgerStats),

    /// Node went online or offline
    Online(bool),
}
