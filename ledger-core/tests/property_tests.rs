//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Deposit then balance returns previous balance + amount
//! - Withdraw succeeds iff amount <= balance, and never changes a balance on failure
//! - Remove succeeds iff balance == 0
//! - Created IDs are always fresh
//! - Snapshot save/load reproduces the map exactly
//! - Concurrent deposits are never lost

use ledger_core::{AccountId, AccountMap, Config, Error, Ledger, SnapshotStore};
use proptest::prelude::*;
use std::collections::HashSet;

/// Create test ledger with temp directory
fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config::with_data_dir(temp_dir.path());

    (Ledger::open(config).unwrap(), temp_dir)
}

/// Strategy for generating account maps
fn account_map_strategy() -> impl Strategy<Value = AccountMap> {
    prop::collection::btree_map(
        (10_000u32..=99_999u32).prop_map(AccountId::new),
        0u64..1_000_000_000u64,
        0..50,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: deposit adds exactly the amount
    #[test]
    fn prop_deposit_then_balance(initial in 0i64..1_000_000, amount in 0i64..1_000_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();
            let account = ledger.create_account().await.unwrap();
            ledger.deposit(account, initial).await.unwrap();

            ledger.deposit(account, amount).await.unwrap();

            let balance = ledger.balance(account).await.unwrap();
            prop_assert_eq!(balance, (initial + amount) as u64);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: withdraw succeeds iff amount <= balance
    #[test]
    fn prop_withdraw(balance in 0i64..1_000_000, amount in 0i64..2_000_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();
            let account = ledger.create_account().await.unwrap();
            ledger.deposit(account, balance).await.unwrap();

            let result = ledger.withdraw(account, amount).await;
            let after = ledger.balance(account).await.unwrap();

            if amount <= balance {
                prop_assert!(result.is_ok());
                prop_assert_eq!(after, (balance - amount) as u64);
            } else {
                let insufficient = matches!(result, Err(Error::InsufficientFunds { .. }));
                prop_assert!(insufficient);
                prop_assert_eq!(after, balance as u64);
            }

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: remove succeeds iff the balance is zero
    #[test]
    fn prop_remove_iff_empty(balance in 0i64..1_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();
            let account = ledger.create_account().await.unwrap();
            ledger.deposit(account, balance).await.unwrap();

            let result = ledger.remove_account(account).await;

            if balance == 0 {
                prop_assert!(result.is_ok());
                prop_assert_eq!(ledger.client_count().await.unwrap(), 0);
            } else {
                let not_empty = matches!(result, Err(Error::AccountNotEmpty(_)));
                prop_assert!(not_empty);
                prop_assert_eq!(ledger.balance(account).await.unwrap(), balance as u64);
            }

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: save then load reproduces any map, including the empty one
    #[test]
    fn prop_snapshot_round_trip(accounts in account_map_strategy()) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(
            temp_dir.path().join("bank_data.json"),
            temp_dir.path().join("bank_data.backup.json"),
        );

        store.save(&accounts).unwrap();
        prop_assert_eq!(store.load(), accounts);
    }
}

#[tokio::test]
async fn test_created_ids_are_distinct() {
    let (ledger, _dir) = create_test_ledger();

    let mut seen = HashSet::new();
    for _ in 0..500 {
        let account = ledger.create_account().await.unwrap();
        assert!(seen.insert(account), "duplicate account {}", account);
    }
    assert_eq!(ledger.client_count().await.unwrap(), 500);

    ledger.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_not_lost() {
    let (ledger, _dir) = create_test_ledger();
    let account = ledger.create_account().await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                ledger.deposit(account, 3).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(ledger.balance(account).await.unwrap(), 50 * 10 * 3);

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_backup_restores_after_primary_loss() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config::with_data_dir(temp_dir.path());

    let ledger = Ledger::open(config.clone()).unwrap();
    let account = ledger.create_account().await.unwrap();
    ledger.deposit(account, 64).await.unwrap();
    ledger.withdraw(account, 0).await.unwrap();
    ledger.shutdown().await.unwrap();

    std::fs::remove_file(config.primary_path()).unwrap();

    let reopened = Ledger::open(config).unwrap();
    assert_eq!(reopened.balance(account).await.unwrap(), 64);
    reopened.shutdown().await.unwrap();
}
