//! Text-line wire protocol
//!
//! One request line in, one response line out. Tokens are separated by
//! whitespace and the operation code is case-insensitive.
//!
//! ```text
//! BC                       -> BC <addr>
//! AC                       -> AC <id>/<addr>
//! BA                       -> BA <sum>
//! BN                       -> BN <count>
//! RP <target>              -> RP <summary>
//! AD <acc>/<addr> <amount> -> AD
//! AW <acc>/<addr> <amount> -> AW
//! AB <acc>/<addr>          -> AB <balance>
//! AR <acc>/<addr>          -> AR
//! (any failure)            -> ER <message>
//! ```

use crate::{Error, Result};
use ledger_core::AccountId;
use std::fmt;

/// `<acc>/<addr>` segment of an account command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTarget {
    /// Account number at the owning node
    pub account: AccountId,

    /// Address of the owning node
    pub address: String,
}

impl AccountTarget {
    /// Parse `<acc>/<addr>`
    pub fn parse(segment: &str) -> Result<Self> {
        let (account, address) = segment.split_once('/').ok_or_else(|| {
            Error::InvalidRequestFormat(format!("expected <account>/<address>, got '{}'", segment))
        })?;

        if address.is_empty() || address.contains('/') {
            return Err(Error::InvalidRequestFormat(format!(
                "invalid bank address in '{}'",
                segment
            )));
        }

        let account = account.parse::<AccountId>().map_err(|_| {
            Error::InvalidRequestFormat(format!("account number must be numeric, got '{}'", account))
        })?;

        Ok(Self {
            account,
            address: address.to_string(),
        })
    }
}

impl fmt::Display for AccountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.address)
    }
}

/// Typed protocol operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `BC`
    BankCode,
    /// `AC`
    AccountCreate,
    /// `BA`
    BankAmount,
    /// `BN`
    BankNumber,
    /// `RP <target>`
    NetworkScan {
        /// Sum to reach
        target: u64,
    },
    /// `AD <acc>/<addr> <amount>`
    Deposit {
        /// Account to credit
        target: AccountTarget,
        /// Amount as sent; the ledger rejects negatives
        amount: i64,
    },
    /// `AW <acc>/<addr> <amount>`
    Withdraw {
        /// Account to debit
        target: AccountTarget,
        /// Amount as sent; the ledger rejects negatives
        amount: i64,
    },
    /// `AB <acc>/<addr>`
    Balance {
        /// Account to read
        target: AccountTarget,
    },
    /// `AR <acc>/<addr>`
    Remove {
        /// Account to close
        target: AccountTarget,
    },
}

impl Command {
    /// Two-letter operation code
    pub fn code(&self) -> &'static str {
        match self {
            Command::BankCode => "BC",
            Command::AccountCreate => "AC",
            Command::BankAmount => "BA",
            Command::BankNumber => "BN",
            Command::NetworkScan { .. } => "RP",
            Command::Deposit { .. } => "AD",
            Command::Withdraw { .. } => "AW",
            Command::Balance { .. } => "AB",
            Command::Remove { .. } => "AR",
        }
    }

    /// Account segment for commands that may be routed to another node
    pub fn account_target(&self) -> Option<&AccountTarget> {
        match self {
            Command::Deposit { target, .. }
            | Command::Withdraw { target, .. }
            | Command::Balance { target }
            | Command::Remove { target } => Some(target),
            _ => None,
        }
    }
}

/// Parsed request plus the exact line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Operation
    pub command: Command,

    /// Original line, forwarded unchanged when proxying
    pub raw: String,
}

impl Request {
    /// Parse one request line
    pub fn parse(line: &str) -> Result<Self> {
        let raw = line.trim();
        let mut tokens = raw.split_whitespace();

        let code = tokens
            .next()
            .ok_or_else(|| Error::InvalidRequestFormat("empty request".to_string()))?
            .to_ascii_uppercase();

        let command = match code.as_str() {
            "BC" => Command::BankCode,
            "AC" => Command::AccountCreate,
            "BA" => Command::BankAmount,
            "BN" => Command::BankNumber,
            "RP" => {
                let target = required(tokens.next(), "target amount")?;
                let target = target.parse::<u64>().map_err(|_| {
                    Error::InvalidRequestFormat(format!(
                        "target amount must be a non-negative integer, got '{}'",
                        target
                    ))
                })?;
                Command::NetworkScan { target }
            }
            "AD" | "AW" => {
                let target = AccountTarget::parse(required(tokens.next(), "<account>/<address>")?)?;
                let amount = required(tokens.next(), "amount")?;
                let amount = amount.parse::<i64>().map_err(|_| {
                    Error::InvalidRequestFormat(format!("amount must be an integer, got '{}'", amount))
                })?;

                if code == "AD" {
                    Command::Deposit { target, amount }
                } else {
                    Command::Withdraw { target, amount }
                }
            }
            "AB" | "AR" => {
                let target = AccountTarget::parse(required(tokens.next(), "<account>/<address>")?)?;

                if code == "AB" {
                    Command::Balance { target }
                } else {
                    Command::Remove { target }
                }
            }
            _ => return Err(Error::UnknownCommand(code)),
        };

        if let Some(extra) = tokens.next() {
            return Err(Error::InvalidRequestFormat(format!(
                "unexpected token '{}' after {}",
                extra,
                command.code()
            )));
        }

        Ok(Self {
            command,
            raw: raw.to_string(),
        })
    }
}

fn required<'a>(token: Option<&'a str>, what: &str) -> Result<&'a str> {
    token.ok_or_else(|| Error::InvalidRequestFormat(format!("missing {}", what)))
}

/// One response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `BC <addr>`
    BankCode(String),
    /// `AC <id>/<addr>`
    AccountCreated {
        /// New account
        account: AccountId,
        /// This node's address
        address: String,
    },
    /// `AD`
    Deposited,
    /// `AW`
    Withdrawn,
    /// `AB <balance>`
    Balance(u64),
    /// `AR`
    Removed,
    /// `BA <sum>`
    BankAmount(u64),
    /// `BN <count>`
    BankNumber(usize),
    /// `RP <summary>`
    NetworkScan(String),
    /// Response of another node, passed through unchanged
    Relayed(String),
    /// `ER <message>`
    Error(String),
}

impl Response {
    /// Whether this is an `ER` line
    pub fn is_error(&self) -> bool {
        match self {
            Response::Error(_) => true,
            Response::Relayed(line) => is_error_line(line),
            _ => false,
        }
    }
}

impl From<Error> for Response {
    fn from(err: Error) -> Self {
        Response::Error(err.to_string())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::BankCode(address) => write!(f, "BC {}", address),
            Response::AccountCreated { account, address } => write!(f, "AC {}/{}", account, address),
            Response::Deposited => write!(f, "AD"),
            Response::Withdrawn => write!(f, "AW"),
            Response::Balance(balance) => write!(f, "AB {}", balance),
            Response::Removed => write!(f, "AR"),
            Response::BankAmount(sum) => write!(f, "BA {}", sum),
            Response::BankNumber(count) => write!(f, "BN {}", count),
            Response::NetworkScan(summary) => write!(f, "RP {}", summary),
            Response::Relayed(line) => write!(f, "{}", line),
            Response::Error(message) => write!(f, "ER {}", message),
        }
    }
}

/// Whether a raw response line reports a failure
pub fn is_error_line(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .map_or(true, |code| code.eq_ignore_ascii_case("ER"))
}

/// Extract the number from a `<code> <n>` response such as `BA 1500`
pub fn parse_figure(line: &str, code: &str) -> Option<u64> {
    let mut tokens = line.split_whitespace();
    if !tokens.next()?.eq_ignore_ascii_case(code) {
        return None;
    }
    let value = tokens.next()?.parse().ok()?;
    match tokens.next() {
        None => Some(value),
        Some(_) => None,
    }
}
