//! Error types for the bank node

use thiserror::Error;

/// Result type for node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Node errors
///
/// Every variant renders as the message part of an `ER <message>` line.
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("{0}")]
    Ledger(#[from] ledger_core::Error),

    /// Malformed request line
    #[error("Invalid request format: {0}")]
    InvalidRequestFormat(String),

    /// Operation code not in the protocol
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Peer unreachable, timed out or answered nothing
    #[error("{0}")]
    NetworkUnreachable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
