//! Persistent translation history.
//! Records are sharded into JSON array files, one directory per target language
//! and one file per shard key, so that a single file stays small and writers to
//! different shards never contend.

pub mod cache;
pub mod shard;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use cache::{CachedLookup, LookupCache};
use shard::ShardLocks;

/// A stored translation. `(original, target_language_code)` is the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryRecord {
    pub original: String,
    /// Empty when the text was seen but not worth displaying.
    pub translated: String,
    #[serde(rename = "tlc")]
    pub target_language_code: String,
    #[serde(rename = "slc")]
    pub source_language_code: String,
}

impl HistoryRecord {
    fn has_key(&self, original: &str, tlc: &str) -> bool {
        self.original == original && self.target_language_code == tlc
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no history for {original:?} ({tlc})")]
    NotFound { original: String, tlc: String },
    #[error("history shard {} is missing or corrupt: {reason}", .path.display())]
    CorruptStore { path: PathBuf, reason: String },
    #[error("history I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

/// What `insert` did to the shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Appended,
    /// The shard was missing or corrupt and now holds only the new record.
    Replaced,
    /// A record for the key already existed; nothing was written.
    AlreadyPresent,
}

/// Sharded on-disk history with an optional LRU in front of its read path.
pub struct HistoryStore {
    root: PathBuf,
    locks: ShardLocks,
    cache: Option<LookupCache>,
}

impl HistoryStore {
    /// Open (or create) the store rooted at `root`. A leading `~` is expanded.
    /// `cache_capacity == 0` disables the lookup cache.
    pub fn open(root: impl AsRef<Path>, cache_capacity: usize) -> Result<Self, HistoryError> {
        let raw = root.as_ref().to_string_lossy();
        let root = PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned());

        if root.exists() {
            if !root.is_dir() {
                return Err(HistoryError::NotADirectory(root));
            }
        } else {
            fs::create_dir_all(&root).map_err(|source| HistoryError::Io {
                path: root.clone(),
                source,
            })?;
        }

        info!(root = %root.display(), cache_capacity, "history store opened");

        Ok(Self {
            root,
            locks: ShardLocks::new(),
            cache: LookupCache::new(cache_capacity),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shard_path(&self, original: &str, tlc: &str) -> PathBuf {
        shard::shard_path(&self.root, original, tlc)
    }

    /// Read the record for `(original, tlc)` straight from its shard file.
    pub fn get(&self, original: &str, tlc: &str) -> Result<HistoryRecord, HistoryError> {
        let path = self.shard_path(original, tlc);
        let records = load_shard(&path)?;
        records
            .into_iter()
            .find(|r| r.has_key(original, tlc))
            .ok_or_else(|| HistoryError::NotFound {
                original: original.to_string(),
                tlc: tlc.to_string(),
            })
    }

    /// Like `get`, but served from the lookup cache when the key was resolved
    /// earlier in this process. Corrupt shards are never remembered.
    pub fn lookup(&self, original: &str, tlc: &str) -> Result<HistoryRecord, HistoryError> {
        let Some(cache) = &self.cache else {
            return self.get(original, tlc);
        };

        match cache.get(original, tlc) {
            Some(CachedLookup::Hit(record)) => return Ok(record),
            Some(CachedLookup::Miss) => {
                return Err(HistoryError::NotFound {
                    original: original.to_string(),
                    tlc: tlc.to_string(),
                })
            }
            None => {}
        }

        let result = self.get(original, tlc);
        match &result {
            Ok(record) => cache.remember_hit(record.clone()),
            Err(HistoryError::NotFound { .. }) => cache.remember_miss(original, tlc),
            Err(_) => {}
        }
        result
    }

    /// Persist `record` unless its key is already stored. Serialized per shard.
    pub fn insert(&self, record: HistoryRecord) -> Result<InsertOutcome, HistoryError> {
        let path = self.shard_path(&record.original, &record.target_language_code);
        let lock = self.locks.lock_for(&path);
        let guard = lock.lock();

        let (outcome, stored) = match load_shard(&path) {
            Ok(mut records) => {
                let existing = records
                    .iter()
                    .find(|r| r.has_key(&record.original, &record.target_language_code))
                    .cloned();
                match existing {
                    Some(existing) => (InsertOutcome::AlreadyPresent, existing),
                    None => {
                        records.push(record.clone());
                        write_shard(&path, &records)?;
                        debug!(path = %path.display(), records = records.len(), "history appended");
                        (InsertOutcome::Appended, record)
                    }
                }
            }
            Err(HistoryError::CorruptStore { reason, .. }) => {
                debug!(path = %path.display(), reason = %reason, "history shard corrupted or empty, overwriting");
                write_shard(&path, std::slice::from_ref(&record))?;
                (InsertOutcome::Replaced, record)
            }
            Err(e) => return Err(e),
        };
        drop(guard);

        if let Some(cache) = &self.cache {
            cache.remember_hit(stored);
        }
        Ok(outcome)
    }
}

fn load_shard(path: &Path) -> Result<Vec<HistoryRecord>, HistoryError> {
    let corrupt = |reason: String| HistoryError::CorruptStore {
        path: path.to_path_buf(),
        reason,
    };
    let content = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))
}

/// Replace the shard atomically: write a sibling temp file, then rename it over
/// the shard so readers see either the old or the new array.
fn write_shard(path: &Path, records: &[HistoryRecord]) -> Result<(), HistoryError> {
    let io_err = |source: std::io::Error| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let bytes = serde_json::to_vec(records).map_err(|e| io_err(std::io::Error::other(e)))?;
    let tmp = shard::temp_path(path);
    {
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)
}
