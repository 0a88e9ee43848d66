//! Disk-based transaction store for manifest lists under construction.
//!
//! Each transaction (keyed by its target list reference) owns a directory
//! named by the sha256 of the full reference; the readable target lives in
//! the index:
//!
//! ```text
//! <root>/
//! └── <sha256 hex of "ghcr.io/org/app:v1">/
//!     ├── index.json            (target, insertion-ordered member digests)
//!     ├── sha256-<hex>.json     (one ManifestRecord per member)
//!     └── ...
//! ```
//!
//! All writes go to a temporary file first and are renamed into place, so a
//! half-written record is never visible. Access is single-writer; concurrent
//! processes operating on the same transaction must serialize externally.

use std::path::{Path, PathBuf};

use a3s_manifest_core::config::StorageLocation;
use a3s_manifest_core::error::{ManifestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::digest::Digest;
use super::record::ManifestRecord;
use super::reference::ImageReference;

const INDEX_FILE: &str = "index.json";

/// Persistent per-transaction index.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransactionIndex {
    target: String,
    members: Vec<Digest>,
    #[serde(default)]
    pushed_digest: Option<Digest>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Summary of a stored transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    /// Target list reference
    pub target: String,
    /// Number of member manifests
    pub members: usize,
    /// Digest of the list if it has been pushed
    pub pushed_digest: Option<Digest>,
    pub updated_at: DateTime<Utc>,
}

/// Store of in-progress manifest lists.
pub struct TransactionStore {
    root: PathBuf,
}

impl TransactionStore {
    /// Open (creating if needed) a store at the given location.
    pub fn new(location: &StorageLocation) -> Result<Self> {
        let root = location.root().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| {
            ManifestError::Other(format!(
                "Failed to create transaction store directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a transaction exists for `target`.
    pub fn exists(&self, target: &ImageReference) -> bool {
        self.transaction_dir(target).join(INDEX_FILE).exists()
    }

    /// Get a member record by digest. Absence (of the record or the whole
    /// transaction) is `Ok(None)`.
    pub fn get(&self, target: &ImageReference, digest: &Digest) -> Result<Option<ManifestRecord>> {
        let path = self.record_path(target, digest);
        if !path.exists() {
            return Ok(None);
        }
        let record = read_record(&path)?;
        Ok(Some(record))
    }

    /// Store a member record.
    ///
    /// With `overwrite == false` an existing record with the same digest is
    /// left untouched and returned. With `overwrite == true` it is replaced
    /// atomically. A new digest is appended to the transaction's member order.
    pub fn put(
        &self,
        target: &ImageReference,
        record: ManifestRecord,
        overwrite: bool,
    ) -> Result<ManifestRecord> {
        record.verify()?;

        let dir = self.transaction_dir(target);
        std::fs::create_dir_all(&dir).map_err(|e| {
            ManifestError::Other(format!(
                "Failed to create transaction directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut index = self.load_index(target)?.unwrap_or_else(|| {
            let now = Utc::now();
            TransactionIndex {
                target: target.full_reference(),
                members: Vec::new(),
                pushed_digest: None,
                created_at: now,
                updated_at: now,
            }
        });

        let path = self.record_path(target, record.digest());
        let is_member = index.members.contains(record.digest());
        if is_member && path.exists() && !overwrite {
            tracing::debug!(
                transaction = %target,
                digest = %record.digest(),
                "Record already stored, keeping local copy"
            );
            return read_record(&path);
        }

        write_atomic(&path, &serde_json::to_vec_pretty(&record)?)?;

        if !is_member {
            index.members.push(record.digest().clone());
        }
        index.updated_at = Utc::now();
        self.save_index(target, &index)?;

        tracing::debug!(
            transaction = %target,
            digest = %record.digest(),
            overwrite,
            "Stored manifest record"
        );
        Ok(record)
    }

    /// List member records in insertion order.
    pub fn list(&self, target: &ImageReference) -> Result<Vec<ManifestRecord>> {
        let index = self
            .load_index(target)?
            .ok_or_else(|| ManifestError::TransactionNotFound(target.full_reference()))?;

        index
            .members
            .iter()
            .map(|digest| {
                let path = self.record_path(target, digest);
                if !path.exists() {
                    return Err(ManifestError::Other(format!(
                        "Transaction {} is missing record {}",
                        target, digest
                    )));
                }
                read_record(&path)
            })
            .collect()
    }

    /// Remove every record of a completed or abandoned transaction.
    pub fn delete(&self, target: &ImageReference) -> Result<()> {
        let dir = self.transaction_dir(target);
        if !dir.exists() {
            return Err(ManifestError::TransactionNotFound(target.full_reference()));
        }
        std::fs::remove_dir_all(&dir).map_err(|e| {
            ManifestError::Other(format!(
                "Failed to remove transaction {}: {}",
                dir.display(),
                e
            ))
        })?;
        tracing::debug!(transaction = %target, "Deleted transaction");
        Ok(())
    }

    /// Record that the list was pushed with `digest`.
    pub fn mark_pushed(&self, target: &ImageReference, digest: &Digest) -> Result<()> {
        let mut index = self
            .load_index(target)?
            .ok_or_else(|| ManifestError::TransactionNotFound(target.full_reference()))?;
        index.pushed_digest = Some(digest.clone());
        index.updated_at = Utc::now();
        self.save_index(target, &index)
    }

    /// Digest the transaction was pushed with, if any.
    pub fn pushed_digest(&self, target: &ImageReference) -> Result<Option<Digest>> {
        Ok(self.load_index(target)?.and_then(|index| index.pushed_digest))
    }

    /// Summaries of all stored transactions, sorted by target.
    pub fn transactions(&self) -> Result<Vec<TransactionInfo>> {
        let mut infos = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let index_path = entry.path().join(INDEX_FILE);
            if !index_path.exists() {
                continue;
            }
            let index: TransactionIndex = serde_json::from_slice(&std::fs::read(&index_path)?)?;
            infos.push(TransactionInfo {
                target: index.target,
                members: index.members.len(),
                pushed_digest: index.pushed_digest,
                updated_at: index.updated_at,
            });
        }
        infos.sort_by(|a, b| a.target.cmp(&b.target));
        Ok(infos)
    }

    fn transaction_dir(&self, target: &ImageReference) -> PathBuf {
        self.root.join(transaction_dir_name(target))
    }

    fn record_path(&self, target: &ImageReference, digest: &Digest) -> PathBuf {
        self.transaction_dir(target)
            .join(format!("{}.json", digest.file_stem()))
    }

    fn load_index(&self, target: &ImageReference) -> Result<Option<TransactionIndex>> {
        let path = self.transaction_dir(target).join(INDEX_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&path).map_err(|e| {
            ManifestError::Other(format!(
                "Failed to read transaction index {}: {}",
                path.display(),
                e
            ))
        })?;
        let index: TransactionIndex = serde_json::from_slice(&data)?;
        if index.target != target.full_reference() {
            return Err(ManifestError::Other(format!(
                "Transaction index {} belongs to {}, not {}",
                path.display(),
                index.target,
                target.full_reference()
            )));
        }
        Ok(Some(index))
    }

    fn save_index(&self, target: &ImageReference, index: &TransactionIndex) -> Result<()> {
        let path = self.transaction_dir(target).join(INDEX_FILE);
        write_atomic(&path, &serde_json::to_vec_pretty(index)?)
    }
}

/// Directory name for a target reference: injective, and free of path
/// separators whatever the reference contains.
fn transaction_dir_name(target: &ImageReference) -> String {
    Digest::sha256(target.full_reference().as_bytes()).hex().to_string()
}

fn read_record(path: &Path) -> Result<ManifestRecord> {
    let data = std::fs::read(path).map_err(|e| {
        ManifestError::Other(format!("Failed to read record {}: {}", path.display(), e))
    })?;
    let record: ManifestRecord = serde_json::from_slice(&data)?;
    record.verify()?;
    Ok(record)
}

/// Write to a sibling temp file, then rename into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data).map_err(|e| {
        ManifestError::Other(format!("Failed to write {}: {}", tmp_path.display(), e))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        ManifestError::Other(format!(
            "Failed to rename {} -> {}: {}",
            tmp_path.display(),
            path.display(),
            e
        ))
    })?;
    Ok(())
}
