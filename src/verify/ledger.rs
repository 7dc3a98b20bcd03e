//! Durable ledger of redeemed purchases.
//!
//! Each email that has ever been verified owns exactly one record file in the
//! ledger directory, named by the SHA-256 of the normalized email. Records are
//! MessagePack encoded and replaced atomically (temp file, fsync, rename,
//! directory fsync), so a write either lands completely or not at all.
//!
//! Upserts for the same email are serialized through a per-email async lock;
//! upserts for different emails never share a lock beyond the short critical
//! sections guarding the in-memory index.

use crate::error::{Error, Result};
use crate::verify::email::normalize_email;
use crate::verify::roles::ItemId;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Identifier of the member who submitted a claim.
pub type RequesterId = u64;

/// File extension of ledger record files.
const RECORD_EXTENSION: &str = "rec";

/// A redeemed email and everything redeemed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    /// Normalized email address.
    pub email: String,
    /// Member the email is bound to (the first successful redeemer).
    pub requester_id: RequesterId,
    /// Items already redeemed under this email.
    pub redeemed_items: BTreeSet<ItemId>,
    /// Time of the last successful redemption.
    pub updated_at: DateTime<Utc>,
}

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    /// The record as it stands after the upsert.
    pub record: RedemptionRecord,
    /// Items this upsert added. Empty means nothing was written.
    pub newly_redeemed: BTreeSet<ItemId>,
}

/// Snapshot exported for external consumption.
#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    generated_at: DateTime<Utc>,
    records: &'a [RedemptionRecord],
}

type EmailLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// File-backed redemption ledger.
pub struct RedemptionLedger {
    dir: PathBuf,
    records: Arc<RwLock<HashMap<String, RedemptionRecord>>>,
    locks: EmailLocks,
    snapshot_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Prunes an email's lock entry when dropped, if nobody else holds it.
struct LockRelease {
    locks: EmailLocks,
    key: String,
}

impl Drop for LockRelease {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

impl RedemptionLedger {
    /// Open (or create) a ledger stored in `dir`, replaying every record file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read, or if a
    /// record file is corrupt.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut records = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let record = read_record(&path)?;
            let expected = record_file_name(&record.email);
            if path.file_name().and_then(|n| n.to_str()) != Some(expected.as_str()) {
                return Err(Error::Ledger(format!(
                    "record for {} stored under wrong file {}",
                    record.email,
                    path.display()
                )));
            }
            records.insert(record.email.clone(), record);
        }

        info!(
            "Redemption ledger opened at {} ({} records)",
            dir.display(),
            records.len()
        );

        Ok(Self {
            dir,
            records: Arc::new(RwLock::new(records)),
            locks: Arc::new(Mutex::new(HashMap::new())),
            snapshot_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Directory holding the record files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up the record for an email (normalized before lookup).
    #[must_use]
    pub fn get(&self, email: &str) -> Option<RedemptionRecord> {
        self.records.read().get(&normalize_email(email)).cloned()
    }

    /// Add `items` to the record for `email`, creating it for `requester_id`
    /// if absent.
    ///
    /// Only items not yet redeemed under the email are added; they are
    /// reported in [`Redemption::newly_redeemed`]. The record is durable on
    /// disk before this returns `Ok`. An existing record keeps its original
    /// requester.
    ///
    /// # Errors
    ///
    /// Returns an error if a new record would be empty or the write fails.
    /// On error neither the disk nor the in-memory index is changed.
    pub async fn upsert(
        &self,
        email: &str,
        requester_id: RequesterId,
        items: &BTreeSet<ItemId>,
    ) -> Result<Redemption> {
        let key = normalize_email(email);
        let release = LockRelease {
            locks: Arc::clone(&self.locks),
            key: key.clone(),
        };
        let guard = self.lock_for(&key).lock_owned().await;

        let existing = self.records.read().get(&key).cloned();
        let (record, newly_redeemed) = match existing {
            Some(mut record) => {
                let newly: BTreeSet<ItemId> =
                    items.difference(&record.redeemed_items).cloned().collect();
                if newly.is_empty() {
                    debug!("No new items for {key}, ledger unchanged");
                    return Ok(Redemption {
                        record,
                        newly_redeemed: newly,
                    });
                }
                record.redeemed_items.extend(newly.iter().cloned());
                record.updated_at = Utc::now();
                (record, newly)
            }
            None => {
                if items.is_empty() {
                    return Err(Error::Ledger(format!(
                        "refusing to create an empty record for {key}"
                    )));
                }
                let record = RedemptionRecord {
                    email: key.clone(),
                    requester_id,
                    redeemed_items: items.clone(),
                    updated_at: Utc::now(),
                };
                (record, items.clone())
            }
        };

        // The guard moves into the blocking task so the email stays locked
        // until the write and index update finish, even if this future is
        // dropped while waiting. The lock entry is pruned after the guard.
        let dir = self.dir.clone();
        let index = Arc::clone(&self.records);
        let to_store = record.clone();
        tokio::task::spawn_blocking(move || {
            let _release = release;
            let _guard = guard;
            write_record(&dir, &to_store)?;
            index.write().insert(key, to_store);
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::Ledger(format!("ledger write task failed: {e}")))??;

        info!(
            "Redeemed {} item(s) for {} (requester {})",
            newly_redeemed.len(),
            record.email,
            record.requester_id
        );

        Ok(Redemption {
            record,
            newly_redeemed,
        })
    }

    /// All records, sorted by email.
    #[must_use]
    pub fn records(&self) -> Vec<RedemptionRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.email.cmp(&b.email));
        records
    }

    /// Number of redeemed emails.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if nothing has been redeemed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Write the current ledger contents as pretty JSON to `path`.
    ///
    /// Exports are serialized and read the ledger only once they hold the
    /// export lock, so a later export never loses to an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the atomic write fails.
    pub async fn export_snapshot(&self, path: &Path) -> Result<()> {
        let guard = Arc::clone(&self.snapshot_lock).lock_owned().await;
        let records = self.records();
        let count = records.len();
        let bytes = serde_json::to_vec_pretty(&Snapshot {
            generated_at: Utc::now(),
            records: &records,
        })?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            write_atomic(&path, &bytes)
        })
        .await
        .map_err(|e| Error::Ledger(format!("snapshot task failed: {e}")))??;
        debug!("Exported {count} ledger records");
        Ok(())
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

/// Record file name for a normalized email.
fn record_file_name(email: &str) -> String {
    let digest = Sha256::digest(email.as_bytes());
    format!("{}.{RECORD_EXTENSION}", hex::encode(digest))
}

fn read_record(path: &Path) -> Result<RedemptionRecord> {
    let bytes = std::fs::read(path)?;
    rmp_serde::from_slice(&bytes)
        .map_err(|e| Error::Ledger(format!("corrupt record {}: {e}", path.display())))
}

fn write_record(dir: &Path, record: &RedemptionRecord) -> Result<()> {
    let bytes = rmp_serde::to_vec_named(record)?;
    write_atomic(&dir.join(record_file_name(&record.email)), &bytes)
}

/// Replace `path` with `bytes` via a synced temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    sync_directory(parent)
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> Result<()> {
    std::fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> Result<()> {
    Ok(())
}
