//! Error types for the ledger

use crate::types::AccountId;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// No account with this ID
    #[error("Account does not exist: {0}")]
    AccountNotFound(AccountId),

    /// Account still holds funds
    #[error("Account is not empty: {0}")]
    AccountNotEmpty(AccountId),

    /// Amount rejected (negative, or balance would overflow)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Withdrawal larger than balance
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Current balance
        balance: u64,
        /// Requested withdrawal
        requested: u64,
    },

    /// Snapshot could not be persisted
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Every account number in range is taken
    #[error("Account ID space exhausted")]
    IdSpaceExhausted,

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
