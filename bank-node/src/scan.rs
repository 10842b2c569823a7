//! Network scan planner (`RP`)
//!
//! Queries candidate peers for their funds (`BA`) and account counts (`BN`),
//! then picks the peers that yield the most funds per affected account until
//! the target sum is reached.
//!
//! # Pipeline
//!
//! 1. **Candidates**: the configured peer list, or the local /24 minus this node
//! 2. **Fan-out**: every candidate queried concurrently, capped by a semaphore;
//!    `BA` and `BN` run in parallel under a per-peer timeout
//! 3. **Deadline**: results gathered before the scan deadline are used, the
//!    rest are abandoned
//! 4. **Selection**: rank by efficiency and accumulate greedily ([`plan`])
//!
//! Unreachable or misbehaving peers are dropped silently; on a subnet sweep
//! most candidates are expected to be absent.

use crate::client::PeerTransport;
use crate::config::ScanConfig;
use crate::protocol::parse_figure;
use std::cmp::Ordering;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Figures one peer reported during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStat {
    /// Peer address
    pub address: String,

    /// Reported total funds (`BA`)
    pub funds: u64,

    /// Reported account count (`BN`)
    pub accounts: u64,
}

impl PeerStat {
    /// Funds per account, with zero accounts counted as one
    pub fn efficiency(&self) -> f64 {
        self.funds as f64 / self.accounts.max(1) as f64
    }

    /// Ranking order: efficiency desc, funds desc, address asc
    ///
    /// Efficiencies are compared as exact fractions so equal ratios tie.
    fn rank(&self, other: &Self) -> Ordering {
        let lhs = self.funds as u128 * other.accounts.max(1) as u128;
        let rhs = other.funds as u128 * self.accounts.max(1) as u128;

        rhs.cmp(&lhs)
            .then_with(|| other.funds.cmp(&self.funds))
            .then_with(|| self.address.cmp(&other.address))
    }
}

/// Outcome of one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Requested sum
    pub target: u64,

    /// Chosen peers, in ranking order
    pub selected: Vec<String>,

    /// Sum of account counts of the chosen peers
    pub accounts_affected: u64,

    /// Sum of funds of the chosen peers
    pub funds_found: u64,

    /// Peers that answered with funds > 0
    pub viable: usize,
}

impl ScanReport {
    /// How much the found funds fall short of the target
    pub fn shortfall(&self) -> u64 {
        self.target.saturating_sub(self.funds_found)
    }

    /// Human-readable summary, the text after `RP `
    pub fn summary(&self) -> String {
        if self.viable == 0 {
            return format!("No viable targets for {}. Funds found: 0", self.target);
        }

        if self.selected.is_empty() {
            return format!(
                "Target {} already met, nothing to draw. Funds found: 0",
                self.target
            );
        }

        let mut summary = format!(
            "To reach {}, draw from: {}. Accounts affected: {}. Funds found: {}",
            self.target,
            self.selected.join(", "),
            self.accounts_affected,
            self.funds_found
        );

        if self.shortfall() > 0 {
            summary.push_str(&format!(". Short by {}", self.shortfall()));
        }

        summary
    }
}

/// Rank peers and greedily select until `target` is reached
pub fn plan(target: u64, stats: Vec<PeerStat>) -> ScanReport {
    let mut ranked: Vec<PeerStat> = stats.into_iter().filter(|s| s.funds > 0).collect();
    ranked.sort_by(PeerStat::rank);

    let mut report = ScanReport {
        target,
        selected: Vec::new(),
        accounts_affected: 0,
        funds_found: 0,
        viable: ranked.len(),
    };

    for peer in ranked {
        if report.funds_found >= target {
            break;
        }
        report.funds_found = report.funds_found.saturating_add(peer.funds);
        report.accounts_affected = report.accounts_affected.saturating_add(peer.accounts);
        report.selected.push(peer.address);
    }

    report
}

/// Runs `RP` scans against the network
pub struct ScanPlanner {
    transport: Arc<dyn PeerTransport>,
    local_address: String,
    peers: Vec<String>,
    port: u16,
    config: ScanConfig,
}

impl std::fmt::Debug for ScanPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanPlanner")
            .field("local_address", &self.local_address)
            .field("peers", &self.peers)
            .field("port", &self.port)
            .field("config", &self.config)
            .finish()
    }
}

impl ScanPlanner {
    /// Create new planner
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        local_address: impl Into<String>,
        peers: Vec<String>,
        port: u16,
        config: ScanConfig,
    ) -> Self {
        Self {
            transport,
            local_address: local_address.into(),
            peers,
            port,
            config,
        }
    }

    /// Addresses the scan will query
    pub fn candidates(&self) -> Vec<String> {
        if !self.peers.is_empty() {
            return self.peers.clone();
        }

        subnet_candidates(&self.local_address)
    }

    /// Scan the network and select peers for `target`
    pub async fn run(&self, target: u64) -> ScanReport {
        let candidates = self.candidates();
        let queried = candidates.len();

        let stats = self.collect_stats(candidates).await;
        let report = plan(target, stats);

        tracing::info!(
            target,
            queried,
            viable = report.viable,
            selected = report.selected.len(),
            funds_found = report.funds_found,
            "Network scan finished"
        );

        report
    }

    /// Query candidates concurrently; stops at the scan deadline
    pub async fn collect_stats(&self, candidates: Vec<String>) -> Vec<PeerStat> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut tasks = JoinSet::new();

        for address in candidates {
            let semaphore = semaphore.clone();
            let transport = self.transport.clone();
            let port = self.port;
            let peer_timeout = self.config.peer_timeout();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                query_peer(transport.as_ref(), address, port, peer_timeout).await
            });
        }

        let mut stats = Vec::new();
        let deadline = tokio::time::sleep(self.config.deadline());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(Some(stat))) => stats.push(stat),
                    Some(Ok(None)) => {}
                    Some(Err(e)) => tracing::warn!(error = %e, "Scan task failed"),
                    None => break,
                },
                _ = &mut deadline => {
                    tracing::warn!(
                        pending = tasks.len(),
                        answered = stats.len(),
                        "Scan deadline reached, abandoning pending peers"
                    );
                    break;
                }
            }
        }

        // Stragglers past the deadline
        tasks.abort_all();
        stats
    }
}

/// Ask one peer for `BA` and `BN`; `None` if it does not answer properly
async fn query_peer(
    transport: &dyn PeerTransport,
    address: String,
    port: u16,
    peer_timeout: Duration,
) -> Option<PeerStat> {
    let exchange = async {
        tokio::join!(
            transport.send_request(&address, port, "BA"),
            transport.send_request(&address, port, "BN"),
        )
    };

    let (funds, accounts) = match tokio::time::timeout(peer_timeout, exchange).await {
        Ok(responses) => responses,
        Err(_) => {
            tracing::debug!(peer = %address, "Scan query timed out");
            return None;
        }
    };

    match (parse_figure(&funds, "BA"), parse_figure(&accounts, "BN")) {
        (Some(funds), Some(accounts)) => Some(PeerStat {
            address,
            funds,
            accounts,
        }),
        _ => {
            tracing::debug!(peer = %address, ba = %funds, bn = %accounts, "Peer skipped");
            None
        }
    }
}

/// Every host of the local /24 except the local address itself
fn subnet_candidates(local_address: &str) -> Vec<String> {
    let local: Ipv4Addr = match local_address.parse() {
        Ok(ip) => ip,
        Err(_) => {
            tracing::warn!(address = local_address, "No IPv4 address to derive a subnet from");
            return Vec::new();
        }
    };

    let [a, b, c, own] = local.octets();
    (1..=254u8)
        .filter(|host| *host != own)
        .map(|host| Ipv4Addr::new(a, b, c, host).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn stat(address: &str, funds: u64, accounts: u64) -> PeerStat {
        PeerStat {
            address: address.to_string(),
            funds,
            accounts,
        }
    }

    /// Answers from a fixed table; unknown hosts answer `ER`
    struct FakeNetwork {
        peers: HashMap<String, (String, String)>,
        delay: Duration,
    }

    #[async_trait]
    impl PeerTransport for FakeNetwork {
        async fn send_request(&self, host: &str, _port: u16, line: &str) -> String {
            tokio::time::sleep(self.delay).await;
            match (self.peers.get(host), line) {
                (Some((ba, _)), "BA") => ba.clone(),
                (Some((_, bn)), "BN") => bn.clone(),
                _ => "ER Connection timed out".to_string(),
            }
        }
    }

    fn fake_network(delay: Duration, peers: &[(&str, &str, &str)]) -> Arc<dyn PeerTransport> {
        Arc::new(FakeNetwork {
            peers: peers
                .iter()
                .map(|(host, ba, bn)| (host.to_string(), (ba.to_string(), bn.to_string())))
                .collect(),
            delay,
        })
    }

    #[test]
    fn test_plan_selects_prefix_reaching_target() {
        let report = plan(
            120,
            vec![
                stat("10.0.0.3", 30, 1),
                stat("10.0.0.1", 100, 1),
                stat("10.0.0.2", 50, 1),
            ],
        );

        assert_eq!(report.selected, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(report.funds_found, 150);
        assert_eq!(report.accounts_affected, 2);
        assert_eq!(report.shortfall(), 0);
        assert_eq!(
            report.summary(),
            "To reach 120, draw from: 10.0.0.1, 10.0.0.2. Accounts affected: 2. Funds found: 150"
        );
    }

    #[test]
    fn test_plan_reports_shortfall() {
        let report = plan(
            500,
            vec![
                stat("10.0.0.1", 100, 2),
                stat("10.0.0.2", 50, 1),
                stat("10.0.0.3", 30, 3),
            ],
        );

        assert_eq!(report.selected.len(), 3);
        assert_eq!(report.funds_found, 180);
        assert_eq!(report.accounts_affected, 6);
        assert_eq!(report.shortfall(), 320);
        assert!(report.summary().ends_with(". Short by 320"));
    }

    #[test]
    fn test_plan_zero_target_draws_nothing() {
        let report = plan(0, vec![stat("10.0.0.1", 100, 2)]);

        assert!(report.selected.is_empty());
        assert_eq!(report.viable, 1);
        assert_eq!(
            report.summary(),
            "Target 0 already met, nothing to draw. Funds found: 0"
        );
    }

    #[test]
    fn test_plan_ranks_by_efficiency_then_funds() {
        let report = plan(
            1,
            vec![
                stat("10.0.0.1", 1000, 100), // 10 per account
                stat("10.0.0.2", 60, 2),     // 30 per account
                stat("10.0.0.3", 90, 3),     // 30 per account, more funds
            ],
        );

        assert_eq!(report.selected, vec!["10.0.0.3"]);
    }

    #[test]
    fn test_plan_zero_accounts_counts_as_one() {
        let mut stats = vec![stat("10.0.0.1", 40, 0), stat("10.0.0.2", 50, 2)];
        stats.sort_by(PeerStat::rank);

        assert_eq!(stats[0].address, "10.0.0.1");
        assert_eq!(stats[0].efficiency(), 40.0);
    }

    #[test]
    fn test_plan_ignores_empty_banks() {
        let report = plan(10, vec![stat("10.0.0.1", 0, 5), stat("10.0.0.2", 0, 0)]);

        assert_eq!(report.viable, 0);
        assert!(report.selected.is_empty());
        assert_eq!(report.summary(), "No viable targets for 10. Funds found: 0");
    }

    #[test]
    fn test_plan_is_deterministic() {
        let stats = vec![
            stat("10.0.0.9", 50, 1),
            stat("10.0.0.4", 50, 1),
            stat("10.0.0.7", 50, 1),
        ];
        let mut reversed = stats.clone();
        reversed.reverse();

        assert_eq!(plan(100, stats), plan(100, reversed));
        assert_eq!(
            plan(100, vec![stat("10.0.0.9", 50, 1), stat("10.0.0.4", 50, 1)]).selected,
            vec!["10.0.0.4", "10.0.0.9"]
        );
    }

    #[test]
    fn test_subnet_candidates_skip_self() {
        let candidates = subnet_candidates("192.168.1.20");

        assert_eq!(candidates.len(), 253);
        assert_eq!(candidates.first().unwrap(), "192.168.1.1");
        assert_eq!(candidates.last().unwrap(), "192.168.1.254");
        assert!(!candidates.contains(&"192.168.1.20".to_string()));
        assert!(subnet_candidates("bank.local").is_empty());
    }

    #[test]
    fn test_explicit_peers_override_sweep() {
        let planner = ScanPlanner::new(
            fake_network(Duration::ZERO, &[]),
            "192.168.1.20",
            vec!["10.1.1.1".to_string()],
            65530,
            ScanConfig::default(),
        );

        assert_eq!(planner.candidates(), vec!["10.1.1.1"]);
    }

    #[tokio::test]
    async fn test_run_drops_failing_peers() {
        let network = fake_network(
            Duration::from_millis(5),
            &[
                ("10.0.0.1", "BA 100", "BN 1"),
                ("10.0.0.2", "BA 50", "BN 1"),
                ("10.0.0.3", "BA 30", "BN 1"),
                ("10.0.0.4", "ER Network error: reset", "BN 1"),
                ("10.0.0.5", "garbage", "BN 2"),
            ],
        );
        let peers = (1..=6).map(|i| format!("10.0.0.{}", i)).collect();
        let planner = ScanPlanner::new(network, "10.0.0.100", peers, 65530, ScanConfig::default());

        let report = planner.run(120).await;

        assert_eq!(report.viable, 3);
        assert_eq!(report.selected, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(report.funds_found, 150);
    }

    #[tokio::test]
    async fn test_slow_peers_time_out() {
        let network = fake_network(Duration::from_millis(500), &[("10.0.0.1", "BA 100", "BN 1")]);
        let config = ScanConfig {
            parallelism: 4,
            peer_timeout_ms: 50,
            deadline_ms: 5_000,
        };
        let planner = ScanPlanner::new(
            network,
            "10.0.0.100",
            vec!["10.0.0.1".to_string()],
            65530,
            config,
        );

        let report = planner.run(10).await;
        assert_eq!(report.viable, 0);
    }

    #[tokio::test]
    async fn test_deadline_bounds_full_sweep() {
        let network = fake_network(Duration::from_millis(200), &[("10.0.0.1", "BA 100", "BN 1")]);
        let config = ScanConfig {
            parallelism: 2,
            peer_timeout_ms: 1_000,
            deadline_ms: 300,
        };
        let planner = ScanPlanner::new(network, "10.0.0.100", Vec::new(), 65530, config);

        let started = std::time::Instant::now();
        let report = planner.run(50).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.selected, vec!["10.0.0.1"]);
    }
}
