//! Whole-store persistence for `MemoryStore`
//!
//! The snapshot is written to a sibling temp file and renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use yara_core::prelude::*;

use crate::memory_db::{MemoryStore, Tables};

/// Current on-disk format
const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    format: u32,
    accounts: Vec<Account>,
    edges: Vec<ReferralEdge>,
    task_progress: Vec<TaskProgress>,
    referral_claims: Vec<ReferralClaimRecord>,
}

fn storage_err(e: std::io::Error) -> YaraError {
    YaraError::StorageError(e.to_string())
}

fn codec_err(e: bincode::Error) -> YaraError {
    YaraError::SerializationError(e.to_string())
}

impl MemoryStore {
    /// Persist every table to `path`
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let tables = self.tables.read();
            Snapshot {
                format: SNAPSHOT_FORMAT,
                accounts: tables.accounts.values().cloned().collect(),
                edges: tables.edges.clone(),
                task_progress: tables.task_progress.values().cloned().collect(),
                referral_claims: tables.referral_claims.clone(),
            }
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(storage_err)?;
        }
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp).map_err(storage_err)?);
            bincode::serialize_into(&mut writer, &snapshot).map_err(codec_err)?;
            writer.flush().map_err(storage_err)?;
        }
        fs::rename(&tmp, path).map_err(storage_err)?;

        tracing::debug!(path = %path.display(), accounts = snapshot.accounts.len(), "snapshot saved");
        Ok(())
    }

    /// Load a store from `path`
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path).map_err(storage_err)?);
        let snapshot: Snapshot = bincode::deserialize_from(reader).map_err(codec_err)?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(YaraError::SerializationError(format!(
                "unsupported snapshot format {}",
                snapshot.format
            )));
        }

        tracing::debug!(path = %path.display(), accounts = snapshot.accounts.len(), "snapshot loaded");
        Ok(Self::from_tables(Tables::from_records(
            snapshot.accounts,
            snapshot.edges,
            snapshot.task_progress,
            snapshot.referral_claims,
        )))
    }

    /// Load `path` if it exists, otherwise start empty
    pub fn open_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_snapshot(path)
        } else {
            Ok(Self::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AccountStore, ChangeSet};

    #[test]
    fn test_snapshot_round_trip_rebuilds_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yara.db");

        let store = MemoryStore::new();
        let mut referrer = store
            .create(Account::new(AccountId::new("r"), "tg-r", "rita", ReferralCode::generate(), 0))
            .unwrap();
        store
            .create(Account::new(AccountId::new("a"), "tg-a", "al", ReferralCode::generate(), 0))
            .unwrap();
        referrer.balance = 1_234;
        referrer.purchased_upgrades.insert(ItemId::new("drill"));
        let mut changes = ChangeSet::new().with_account(referrer.clone());
        changes.add_edge(ReferralEdge {
            referrer: AccountId::new("r"),
            referred: AccountId::new("a"),
            created_at: 5,
        });
        let mut progress = TaskProgress::new(AccountId::new("a"), TaskId::new("join"));
        progress.mark_completed(9);
        changes.put_task_progress(progress.clone());
        store.commit(changes).unwrap();

        store.save_snapshot(&path).unwrap();
        let loaded = MemoryStore::load_snapshot(&path).unwrap();

        let r = loaded.get_by_code(&referrer.referral_code).unwrap().unwrap();
        assert_eq!(r.balance, 1_234);
        assert!(r.has_purchased(&ItemId::new("drill")));
        assert_eq!(r.version, 1);
        assert_eq!(loaded.referrals_of(&r.id).unwrap(), vec![AccountId::new("a")]);
        assert_eq!(
            loaded.task_progress(&AccountId::new("a"), &TaskId::new("join")).unwrap(),
            Some(progress)
        );
        assert!(loaded.get_by_external_id("tg-a").unwrap().is_some());
    }

    #[test]
    fn test_open_missing_path_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open_or_default(&dir.path().join("missing.db")).unwrap();
        assert_eq!(store.account_count().unwrap(), 0);
    }

    #[test]
    fn test_garbage_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.db");
        fs::write(&path, b"not a snapshot").unwrap();
        assert!(matches!(
            MemoryStore::load_snapshot(&path),
            Err(YaraError::SerializationError(_))
        ));
    }
}
