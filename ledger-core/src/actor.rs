//! Actor-based concurrency for the ledger
//!
//! Every ledger operation is a message to one task that owns the account map
//! and the snapshot store. Mutation and persistence happen in the same
//! message turn, so concurrent requests from any number of connections are
//! fully serialized.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │           Connection sessions (one per socket)        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   mutate AccountMap → SnapshotStore::save()           │
//! │                       │                               │
//! │                       ▼                               │
//! │        broadcast::Sender<LedgerNotification>          │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::metrics::Metrics;
use crate::storage::SnapshotStore;
use crate::types::{
    AccountId, AccountMap, LedgerNotification, LedgerStats, MAX_ACCOUNT_ID, MIN_ACCOUNT_ID,
};
use crate::{Error, Result};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Open a new empty account
    CreateAccount {
        /// Reply channel
        response: oneshot::Sender<Result<AccountId>>,
    },

    /// Credit an account
    Deposit {
        /// Target account
        account: AccountId,
        /// Requested amount
        amount: i64,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Debit an account
    Withdraw {
        /// Target account
        account: AccountId,
        /// Requested amount
        amount: i64,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Read one balance
    GetBalance {
        /// Target account
        account: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<u64>>,
    },

    /// Close an empty account
    RemoveAccount {
        /// Target account
        account: AccountId,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Read aggregate figures
    GetStats {
        /// Reply channel
        response: oneshot::Sender<LedgerStats>,
    },

    /// Copy of the whole account map
    GetSnapshot {
        /// Reply channel
        response: oneshot::Sender<AccountMap>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the account map
pub struct LedgerActor {
    /// Authoritative balances
    accounts: AccountMap,

    /// Storage backend
    store: SnapshotStore,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Observer channel
    notifier: broadcast::Sender<LedgerNotification>,

    /// Set while the last save failed
    memory_only: Arc<AtomicBool>,

    /// Metrics
    metrics: Metrics,
}

impl std::fmt::Debug for LedgerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerActor")
            .field("accounts", &self.accounts.len())
            .field("store", &self.store)
            .field("memory_only", &self.memory_only.load(Ordering::SeqCst))
            .finish()
    }
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        accounts: AccountMap,
        store: SnapshotStore,
        mailbox: mpsc::Receiver<LedgerMessage>,
        notifier: broadcast::Sender<LedgerNotification>,
        memory_only: Arc<AtomicBool>,
        metrics: Metrics,
    ) -> Self {
        metrics.update_stats(&LedgerStats::from_accounts(&accounts));

        Self {
            accounts,
            store,
            mailbox,
            notifier,
            memory_only,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                break;
            }
            self.handle_message(msg);
        }

        tracing::debug!(accounts = self.accounts.len(), "Ledger actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::CreateAccount { response } => {
                let _ = response.send(self.create_account());
            }

            LedgerMessage::Deposit {
                account,
                amount,
                response,
            } => {
                let _ = response.send(self.deposit(account, amount));
            }

            LedgerMessage::Withdraw {
                account,
                amount,
                response,
            } => {
                let _ = response.send(self.withdraw(account, amount));
            }

            LedgerMessage::GetBalance { account, response } => {
                let _ = response.send(self.balance(account));
            }

            LedgerMessage::RemoveAccount { account, response } => {
                let _ = response.send(self.remove_account(account));
            }

            LedgerMessage::GetStats { response } => {
                let _ = response.send(LedgerStats::from_accounts(&self.accounts));
            }

            LedgerMessage::GetSnapshot { response } => {
                let _ = response.send(self.accounts.clone());
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn create_account(&mut self) -> Result<AccountId> {
        let id_space = (MAX_ACCOUNT_ID - MIN_ACCOUNT_ID + 1) as usize;
        if self.accounts.len() >= id_space {
            return Err(Error::IdSpaceExhausted);
        }

        let mut rng = rand::thread_rng();
        let account = loop {
            let candidate = AccountId::new(rng.gen_range(MIN_ACCOUNT_ID..=MAX_ACCOUNT_ID));
            if !self.accounts.contains_key(&candidate) {
                break candidate;
            }
        };

        self.accounts.insert(account, 0);
        tracing::info!(account = %account, "Account created");
        self.commit();

        Ok(account)
    }

    fn deposit(&mut self, account: AccountId, amount: i64) -> Result<()> {
        let balance = self
            .accounts
            .get_mut(&account)
            .ok_or(Error::AccountNotFound(account))?;

        let amount = u64::try_from(amount)
            .map_err(|_| Error::InvalidAmount(format!("negative deposit {}", amount)))?;

        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| Error::InvalidAmount(format!("deposit {} overflows balance", amount)))?;

        tracing::debug!(account = %account, amount, "Deposit");
        self.commit();
        Ok(())
    }

    fn withdraw(&mut self, account: AccountId, amount: i64) -> Result<()> {
        let balance = self
            .accounts
            .get_mut(&account)
            .ok_or(Error::AccountNotFound(account))?;

        let amount = u64::try_from(amount)
            .map_err(|_| Error::InvalidAmount(format!("negative withdrawal {}", amount)))?;

        if *balance < amount {
            return Err(Error::InsufficientFunds {
                balance: *balance,
                requested: amount,
            });
        }

        *balance -= amount;

        tracing::debug!(account = %account, amount, "Withdrawal");
        self.commit();
        Ok(())
    }

    fn balance(&self, account: AccountId) -> Result<u64> {
        self.accounts
            .get(&account)
            .copied()
            .ok_or(Error::AccountNotFound(account))
    }

    fn remove_account(&mut self, account: AccountId) -> Result<()> {
        match self.accounts.get(&account) {
            None => return Err(Error::AccountNotFound(account)),
            Some(&balance) if balance != 0 => return Err(Error::AccountNotEmpty(account)),
            Some(_) => {}
        }

        self.accounts.remove(&account);
        tracing::info!(account = %account, "Account removed");
        self.commit();
        Ok(())
    }

    /// Persist and broadcast after a mutation
    ///
    /// A failed save keeps the in-memory change: the node keeps serving from
    /// memory until a later save succeeds.
    fn commit(&mut self) {
        match self.store.save(&self.accounts) {
            Ok(()) => {
                if self.memory_only.swap(false, Ordering::SeqCst) {
                    tracing::info!("Snapshot persisted again, leaving memory-only mode");
                }
            }
            Err(e) => {
                self.metrics.record_storage_failure();
                self.memory_only.store(true, Ordering::SeqCst);
                tracing::error!(error = %e, "CRITICAL: snapshot not persisted, running in memory-only mode");
            }
        }

        let stats = LedgerStats::from_accounts(&self.accounts);
        self.metrics.record_mutation(&stats);

        // No receivers is fine
        let _ = self.notifier.send(LedgerNotification::Stats(stats));
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Open a new account
    pub async fn create_account(&self) -> Result<AccountId> {
        self.call(|response| LedgerMessage::CreateAccount { response })
            .await?
    }

    /// Credit an account
    pub async fn deposit(&self, account: AccountId, amount: i64) -> Result<()> {
        self.call(|response| LedgerMessage::Deposit {
            account,
            amount,
            response,
        })
        .await?
    }

    /// Debit an account
    pub async fn withdraw(&self, account: AccountId, amount: i64) -> Result<()> {
        self.call(|response| LedgerMessage::Withdraw {
            account,
            amount,
            response,
        })
        .await?
    }

    /// Read one balance
    pub async fn balance(&self, account: AccountId) -> Result<u64> {
        self.call(|response| LedgerMessage::GetBalance { account, response })
            .await?
    }

    /// Close an empty account
    pub async fn remove_account(&self, account: AccountId) -> Result<()> {
        self.call(|response| LedgerMessage::RemoveAccount { account, response })
            .await?
    }

    /// Aggregate figures
    pub async fn stats(&self) -> Result<LedgerStats> {
        self.call(|response| LedgerMessage::GetStats { response })
            .await
    }

    /// Copy of the account map
    pub async fn snapshot(&self) -> Result<AccountMap> {
        self.call(|response| LedgerMessage::GetSnapshot { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    accounts: AccountMap,
    store: SnapshotStore,
    notifier: broadcast::Sender<LedgerNotification>,
    memory_only: Arc<AtomicBool>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = LedgerActor::new(accounts, store, rx, notifier, memory_only, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
