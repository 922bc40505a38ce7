//! In-memory LRU in front of the shard read path.
//! Key: blake3 hash of (tlc | original). Entries are never expired: a key that
//! has been translated once keeps its translation.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use super::HistoryRecord;

/// Default number of remembered lookups.
pub const DEFAULT_CAPACITY: usize = 256;

/// What a previous lookup resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedLookup {
    Hit(HistoryRecord),
    /// The shard parsed but had no record for the key.
    Miss,
}

pub struct LookupCache {
    inner: Mutex<LruCache<[u8; 32], CachedLookup>>,
}

impl LookupCache {
    /// Returns `None` for a zero capacity.
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn compute_key(original: &str, tlc: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(tlc.as_bytes());
        hasher.update(b"|");
        hasher.update(original.as_bytes());
        *hasher.finalize().as_bytes()
    }

    pub fn get(&self, original: &str, tlc: &str) -> Option<CachedLookup> {
        let key = Self::compute_key(original, tlc);
        self.inner.lock().get(&key).cloned()
    }

    pub fn remember_hit(&self, record: HistoryRecord) {
        let key = Self::compute_key(&record.original, &record.target_language_code);
        self.inner.lock().put(key, CachedLookup::Hit(record));
    }

    /// Remember that the key was absent. A `Hit` written meanwhile by `insert`
    /// is kept: the read that saw the key missing may predate that insert.
    pub fn remember_miss(&self, original: &str, tlc: &str) {
        let key = Self::compute_key(original, tlc);
        let mut inner = self.inner.lock();
        if inner.peek(&key).is_none() {
            inner.put(key, CachedLookup::Miss);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
