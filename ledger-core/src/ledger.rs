//! Main ledger interface
//!
//! Ties the snapshot store, the actor and the observer channel together.
//! `Ledger` is a cheap handle: clone it into every component that needs the
//! accounts; all clones talk to the same actor.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     let account = ledger.create_account().await?;
//!     ledger.deposit(account, 100).await?;
//!     assert_eq!(ledger.balance(account).await?, 100);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    storage::SnapshotStore,
    types::{AccountId, AccountMap, LedgerNotification, LedgerStats},
    Config, Error, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Receives ledger figures after every mutation
///
/// Implementations run on a forwarding task, never inside the ledger actor.
pub trait LedgerObserver: Send + Sync + 'static {
    /// Called with the current totals
    fn update(&self, total_funds: u64, client_count: usize);

    /// Called when the node goes online or offline
    fn online_changed(&self, _online: bool) {}
}

/// Main ledger interface
#[derive(Clone, Debug)]
pub struct Ledger {
    /// Actor handle
    handle: LedgerHandle,

    /// Observer channel
    notifier: broadcast::Sender<LedgerNotification>,

    /// Node-wide online flag
    online: Arc<AtomicBool>,

    /// Last save failed
    memory_only: Arc<AtomicBool>,

    /// Metrics shared with the actor
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// Loads the newest readable snapshot and spawns the actor; must be
    /// called inside a Tokio runtime.
    pub fn open(config: Config) -> Result<Self> {
        let metrics = Metrics::new().map_err(|e| Error::Config(format!("metrics: {}", e)))?;
        let store = SnapshotStore::open(&config);
        let accounts = store.load();

        tracing::info!(
            primary = %store.primary_path().display(),
            accounts = accounts.len(),
            "Ledger opened"
        );

        Ok(Self::with_store(accounts, store, &config, metrics))
    }

    fn with_store(
        accounts: AccountMap,
        store: SnapshotStore,
        config: &Config,
        metrics: Metrics,
    ) -> Self {
        let (notifier, _) = broadcast::channel(config.notification_capacity.max(1));
        let memory_only = Arc::new(AtomicBool::new(false));

        let handle = spawn_ledger_actor(
            accounts,
            store,
            notifier.clone(),
            memory_only.clone(),
            metrics.clone(),
            config.mailbox_capacity,
        );

        Self {
            handle,
            notifier,
            online: Arc::new(AtomicBool::new(false)),
            memory_only,
            metrics,
        }
    }

    /// Open a new account with a random unused number
    pub async fn create_account(&self) -> Result<AccountId> {
        self.handle.create_account().await
    }

    /// Credit `amount` to an account
    pub async fn deposit(&self, account: AccountId, amount: i64) -> Result<()> {
        self.handle.deposit(account, amount).await
    }

    /// Debit `amount` from an account
    pub async fn withdraw(&self, account: AccountId, amount: i64) -> Result<()> {
        self.handle.withdraw(account, amount).await
    }

    /// Current balance
    pub async fn balance(&self, account: AccountId) -> Result<u64> {
        self.handle.balance(account).await
    }

    /// Close an account; only allowed at zero balance
    pub async fn remove_account(&self, account: AccountId) -> Result<()> {
        self.handle.remove_account(account).await
    }

    /// Sum of all balances
    pub async fn total_funds(&self) -> Result<u64> {
        Ok(self.handle.stats().await?.total_funds)
    }

    /// Number of accounts
    pub async fn client_count(&self) -> Result<usize> {
        Ok(self.handle.stats().await?.client_count)
    }

    /// Both aggregate figures from one consistent read
    pub async fn stats(&self) -> Result<LedgerStats> {
        self.handle.stats().await
    }

    /// Copy of the account map
    pub async fn snapshot(&self) -> Result<AccountMap> {
        self.handle.snapshot().await
    }

    /// Raw notification stream
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerNotification> {
        self.notifier.subscribe()
    }

    /// Forward notifications to an observer
    ///
    /// The observer immediately receives the current figures, then every
    /// later change. The forwarding task ends when the ledger is dropped.
    pub fn attach<O: LedgerObserver>(&self, observer: Arc<O>) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        let handle = self.handle.clone();
        let online = self.online.load(Ordering::SeqCst);

        tokio::spawn(async move {
            observer.online_changed(online);
            if let Ok(stats) = handle.stats().await {
                observer.update(stats.total_funds, stats.client_count);
            }

            loop {
                match rx.recv().await {
                    Ok(LedgerNotification::Stats(stats)) => {
                        observer.update(stats.total_funds, stats.client_count);
                    }
                    Ok(LedgerNotification::Online(online)) => {
                        observer.online_changed(online);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Observer lagging, notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Broadcast the current figures to all observers
    pub async fn notify(&self) -> Result<()> {
        let stats = self.handle.stats().await?;
        let _ = self.notifier.send(LedgerNotification::Stats(stats));
        Ok(())
    }

    /// Set the online flag and tell observers
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        let _ = self.notifier.send(LedgerNotification::Online(online));
    }

    /// Whether the node is accepting connections
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether the last snapshot save failed
    pub fn is_memory_only(&self) -> bool {
        self.memory_only.load(Ordering::SeqCst)
    }

    /// Ledger metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown ledger
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(temp_dir.path());

        (Ledger::open(config).unwrap(), temp_dir)
    }

    #[derive(Default)]
    struct RecordingObserver {
        updates: Mutex<Vec<(u64, usize)>>,
        online: Mutex<Vec<bool>>,
    }

    impl LedgerObserver for RecordingObserver {
        fn update(&self, total_funds: u64, client_count: usize) {
            self.updates.lock().push((total_funds, client_count));
        }

        fn online_changed(&self, online: bool) {
            self.online.lock().push(online);
        }
    }

    #[tokio::test]
    async fn test_deposit_withdraw_balance() {
        let (ledger, _dir) = create_test_ledger().await;

        let account = ledger.create_account().await.unwrap();
        ledger.deposit(account, 100).await.unwrap();
        ledger.withdraw(account, 30).await.unwrap();

        assert_eq!(ledger.balance(account).await.unwrap(), 70);
        assert_eq!(ledger.total_funds().await.unwrap(), 70);
        assert_eq!(ledger.client_count().await.unwrap(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_negative_amounts_rejected() {
        let (ledger, _dir) = create_test_ledger().await;
        let account = ledger.create_account().await.unwrap();
        ledger.deposit(account, 10).await.unwrap();

        assert!(matches!(
            ledger.deposit(account, -5).await,
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.withdraw(account, -5).await,
            Err(Error::InvalidAmount(_))
        ));
        assert_eq!(ledger.balance(account).await.unwrap(), 10);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_balance() {
        let (ledger, _dir) = create_test_ledger().await;
        let account = ledger.create_account().await.unwrap();
        ledger.deposit(account, 40).await.unwrap();

        let result = ledger.withdraw(account, 41).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientFunds {
                balance: 40,
                requested: 41
            })
        ));
        assert_eq!(ledger.balance(account).await.unwrap(), 40);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_requires_zero_balance() {
        let (ledger, _dir) = create_test_ledger().await;
        let account = ledger.create_account().await.unwrap();
        ledger.deposit(account, 1).await.unwrap();

        assert!(matches!(
            ledger.remove_account(account).await,
            Err(Error::AccountNotEmpty(_))
        ));
        assert_eq!(ledger.balance(account).await.unwrap(), 1);

        ledger.withdraw(account, 1).await.unwrap();
        ledger.remove_account(account).await.unwrap();

        assert!(matches!(
            ledger.balance(account).await,
            Err(Error::AccountNotFound(_))
        ));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();

        let ledger = Ledger::open(Config::with_data_dir(temp_dir.path())).unwrap();
        let account = ledger.create_account().await.unwrap();
        ledger.deposit(account, 900).await.unwrap();
        ledger.shutdown().await.unwrap();

        let reopened = Ledger::open(Config::with_data_dir(temp_dir.path())).unwrap();
        assert_eq!(reopened.balance(account).await.unwrap(), 900);
        reopened.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_serving_from_memory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let ledger = Ledger::open(Config::with_data_dir(blocker.join("data"))).unwrap();
        let account = ledger.create_account().await.unwrap();
        ledger.deposit(account, 15).await.unwrap();

        assert_eq!(ledger.balance(account).await.unwrap(), 15);
        assert!(ledger.is_memory_only());
        assert_eq!(ledger.metrics().storage_failures_total.get(), 2);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_observer_receives_updates() {
        let (ledger, _dir) = create_test_ledger().await;
        let observer = Arc::new(RecordingObserver::default());
        ledger.attach(observer.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;

        let account = ledger.create_account().await.unwrap();
        ledger.deposit(account, 75).await.unwrap();
        ledger.set_online(true);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let updates = observer.updates.lock().clone();
        assert_eq!(updates.first(), Some(&(0, 0)));
        assert_eq!(updates.last(), Some(&(75, 1)));
        assert_eq!(observer.online.lock().as_slice(), &[false, true]);
        assert!(ledger.is_online());

        ledger.shutdown().await.unwrap();
    }
}
