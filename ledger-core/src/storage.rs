//! Snapshot storage with a rotated backup
//!
//! # Files
//!
//! - primary: the last successfully committed account map
//! - backup: the primary as it was one save earlier
//!
//! Every save writes the new snapshot to a synced temporary file first. Only
//! then is a readable primary copied over the backup and the temporary file
//! renamed into place. A failed or interrupted save leaves the last good
//! snapshot readable.

use crate::{
    error::{Error, Result},
    types::AccountMap,
    Config,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Primary + backup JSON snapshot store
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    primary: PathBuf,
    backup: PathBuf,
}

impl SnapshotStore {
    /// Store using the paths from configuration
    pub fn open(config: &Config) -> Self {
        Self::new(config.primary_path(), config.backup_path())
    }

    /// Store with explicit paths
    pub fn new(primary: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            backup: backup.into(),
        }
    }

    /// Primary snapshot path
    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    /// Backup snapshot path
    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Load the newest readable snapshot
    ///
    /// Never fails: a missing or corrupt primary falls back to the backup,
    /// and if both are unusable the ledger starts empty.
    pub fn load(&self) -> AccountMap {
        match Self::read_snapshot(&self.primary) {
            Ok(Some(accounts)) => {
                tracing::info!(
                    path = %self.primary.display(),
                    accounts = accounts.len(),
                    "Loaded primary snapshot"
                );
                return accounts;
            }
            Ok(None) => {
                tracing::debug!(path = %self.primary.display(), "No primary snapshot");
            }
            Err(e) => {
                tracing::error!(
                    path = %self.primary.display(),
                    error = %e,
                    "Primary snapshot unreadable, trying backup"
                );
            }
        }

        match Self::read_snapshot(&self.backup) {
            Ok(Some(accounts)) => {
                tracing::warn!(
                    path = %self.backup.display(),
                    accounts = accounts.len(),
                    "Recovered ledger from backup snapshot"
                );
                accounts
            }
            Ok(None) => {
                tracing::info!("No snapshot found, starting with an empty ledger");
                AccountMap::new()
            }
            Err(e) => {
                tracing::error!(
                    path = %self.backup.display(),
                    error = %e,
                    "Backup snapshot unreadable, starting with an empty ledger"
                );
                AccountMap::new()
            }
        }
    }

    /// Persist the full account map
    pub fn save(&self, accounts: &AccountMap) -> Result<()> {
        if let Some(dir) = self.primary.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .map_err(|e| Error::StorageFailure(format!("{}: {}", dir.display(), e)))?;
            }
        }

        let tmp = self.tmp_path();
        if let Err(e) = Self::write_synced(&tmp, accounts) {
            let _ = fs::remove_file(&tmp);
            return Err(self.failure(e));
        }

        self.rotate_backup();

        if let Err(e) = fs::rename(&tmp, &self.primary) {
            let _ = fs::remove_file(&tmp);
            return Err(self.failure(e));
        }

        tracing::debug!(
            path = %self.primary.display(),
            accounts = accounts.len(),
            "Snapshot saved"
        );

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .primary
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.primary.with_file_name(name)
    }

    /// Copy the primary over the backup, only if the primary still parses
    fn rotate_backup(&self) {
        match Self::read_snapshot(&self.primary) {
            Ok(Some(_)) => {
                if let Err(e) = fs::copy(&self.primary, &self.backup) {
                    tracing::warn!(
                        backup = %self.backup.display(),
                        error = %e,
                        "Backup rotation failed"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.primary.display(),
                    error = %e,
                    "Primary snapshot unreadable, keeping existing backup"
                );
            }
        }
    }

    fn write_synced(tmp: &Path, accounts: &AccountMap) -> Result<()> {
        let bytes = serde_json::to_vec(accounts)?;

        let mut file = File::create(tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    fn failure(&self, err: impl std::fmt::Display) -> Error {
        Error::StorageFailure(format!("{}: {}", self.primary.display(), err))
    }

    fn read_snapshot(path: &Path) -> Result<Option<AccountMap>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read(path)?;
        let accounts: AccountMap = serde_json::from_slice(&content)?;
        Ok(Some(accounts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;

    fn test_store(dir: &Path) -> SnapshotStore {
        SnapshotStore::new(dir.join("bank_data.json"), dir.join("bank_data.backup.json"))
    }

    fn sample_accounts() -> AccountMap {
        let mut accounts = AccountMap::new();
        accounts.insert(AccountId::new(12345), 500);
        accounts.insert(AccountId::new(54321), 0);
        accounts
    }

    #[test]
    fn test_load_missing_files_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let accounts = sample_accounts();
        store.save(&accounts).unwrap();

        assert_eq!(store.load(), accounts);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_save_rotates_previous_primary_to_backup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let first = sample_accounts();
        store.save(&first).unwrap();
        assert!(!store.backup_path().exists());

        let mut second = first.clone();
        second.insert(AccountId::new(11111), 42);
        store.save(&second).unwrap();

        let backup: AccountMap =
            serde_json::from_slice(&fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup, first);
        assert_eq!(store.load(), second);
    }

    #[test]
    fn test_corrupt_primary_falls_back_to_backup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let accounts = sample_accounts();
        store.save(&accounts).unwrap();
        store.save(&accounts).unwrap();

        fs::write(store.primary_path(), b"{ not json").unwrap();

        assert_eq!(store.load(), accounts);
    }

    #[test]
    fn test_deleted_primary_falls_back_to_backup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let accounts = sample_accounts();
        store.save(&accounts).unwrap();
        store.save(&accounts).unwrap();

        fs::remove_file(store.primary_path()).unwrap();

        assert_eq!(store.load(), accounts);
    }

    #[test]
    fn test_both_corrupt_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        fs::write(store.primary_path(), b"garbage").unwrap();
        fs::write(store.backup_path(), b"more garbage").unwrap();

        assert!(store.load().is_empty());
    }

    #[test]
    fn test_failed_save_keeps_backup_of_corrupt_primary() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let mut accounts = AccountMap::new();
        accounts.insert(AccountId::new(12345), 777);
        store.save(&accounts).unwrap();
        store.save(&accounts).unwrap();

        fs::write(store.primary_path(), b"{ not json").unwrap();
        assert_eq!(store.load(), accounts);

        // A directory where the temporary file goes makes the write fail
        fs::create_dir(store.tmp_path()).unwrap();
        let result = store.save(&AccountMap::new());
        assert!(matches!(result, Err(Error::StorageFailure(_))));

        assert_eq!(store.load(), accounts);
    }

    #[test]
    fn test_save_over_corrupt_primary_keeps_good_backup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        let accounts = sample_accounts();
        store.save(&accounts).unwrap();
        store.save(&accounts).unwrap();
        fs::write(store.primary_path(), b"garbage").unwrap();

        let mut next = accounts.clone();
        next.insert(AccountId::new(22222), 5);
        store.save(&next).unwrap();

        let backup: AccountMap =
            serde_json::from_slice(&fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup, accounts);
        assert_eq!(store.load(), next);
    }

    #[test]
    fn test_unwritable_location_is_storage_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let blocker = temp_dir.path().join("not_a_dir");
        fs::write(&blocker, b"file in the way").unwrap();

        let store = SnapshotStore::new(blocker.join("bank_data.json"), blocker.join("backup.json"));
        let result = store.save(&sample_accounts());

        assert!(matches!(result, Err(Error::StorageFailure(_))));
    }
}
