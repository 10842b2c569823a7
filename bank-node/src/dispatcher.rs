//! Request dispatcher
//!
//! Turns one request line into exactly one response line. Account commands
//! addressed to another node are forwarded unchanged and the peer's answer is
//! relayed verbatim; everything else runs against the local ledger. No
//! request, however malformed, produces anything but a response line.

use crate::client::PeerTransport;
use crate::metrics::NodeMetrics;
use crate::protocol::{Command, Request, Response};
use crate::scan::ScanPlanner;
use crate::{Config, Result};
use ledger_core::Ledger;
use std::net::IpAddr;
use std::sync::Arc;

/// Routes parsed requests to the ledger, a peer or the scan planner
pub struct Dispatcher {
    ledger: Ledger,
    transport: Arc<dyn PeerTransport>,
    planner: ScanPlanner,
    address: String,
    port: u16,
    metrics: NodeMetrics,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("planner", &self.planner)
            .finish()
    }
}

impl Dispatcher {
    /// Create new dispatcher
    pub fn new(
        config: &Config,
        ledger: Ledger,
        transport: Arc<dyn PeerTransport>,
        metrics: NodeMetrics,
    ) -> Self {
        let planner = ScanPlanner::new(
            transport.clone(),
            config.address.clone(),
            config.peers.clone(),
            config.port,
            config.scan.clone(),
        );

        Self {
            ledger,
            transport,
            planner,
            address: config.address.clone(),
            port: config.port,
            metrics,
        }
    }

    /// This node's address as reported to clients
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Handle one request line
    pub async fn dispatch(&self, line: &str) -> String {
        let response = match Request::parse(line) {
            Ok(request) => self.execute(request).await.unwrap_or_else(Response::from),
            Err(e) => Response::from(e),
        };

        self.metrics.record_command(response.is_error());
        response.to_string()
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        if let Some(target) = request.command.account_target() {
            if !self.is_local(&target.address) {
                return Ok(self.forward(&target.address, &request.raw).await);
            }
        }

        let response = match request.command {
            Command::BankCode => Response::BankCode(self.address.clone()),
            Command::AccountCreate => Response::AccountCreated {
                account: self.ledger.create_account().await?,
                address: self.address.clone(),
            },
            Command::BankAmount => Response::BankAmount(self.ledger.total_funds().await?),
            Command::BankNumber => Response::BankNumber(self.ledger.client_count().await?),
            Command::NetworkScan { target } => {
                Response::NetworkScan(self.planner.run(target).await.summary())
            }
            Command::Deposit { target, amount } => {
                self.ledger.deposit(target.account, amount).await?;
                Response::Deposited
            }
            Command::Withdraw { target, amount } => {
                self.ledger.withdraw(target.account, amount).await?;
                Response::Withdrawn
            }
            Command::Balance { target } => Response::Balance(self.ledger.balance(target.account).await?),
            Command::Remove { target } => {
                self.ledger.remove_account(target.account).await?;
                Response::Removed
            }
        };

        Ok(response)
    }

    /// Forward a raw line to the owning node, one hop
    async fn forward(&self, address: &str, raw: &str) -> Response {
        tracing::info!(peer = %address, request = %raw, "Proxying request");
        self.metrics.proxied_total.inc();

        Response::Relayed(self.transport.send_request(address, self.port, raw).await)
    }

    /// Whether `address` names this node
    ///
    /// Matches the configured address, `localhost`, and any loopback or
    /// unspecified IP literal.
    pub fn is_local(&self, address: &str) -> bool {
        if address == self.address || address.eq_ignore_ascii_case("localhost") {
            return true;
        }

        match address.parse::<IpAddr>() {
            Ok(ip) => {
                ip.is_loopback()
                    || ip.is_unspecified()
                    || self.address.parse::<IpAddr>().map_or(false, |own| own == ip)
            }
            Err(_) => false,
        }
    }
}
