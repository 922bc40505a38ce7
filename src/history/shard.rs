//! Shard addressing and the process-wide shard lock table.
//! A record lives in `<root>/<tlc>/<k>` where `k` is the first hex character of
//! the blake3 digest of its original text (16 shards per target language).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Number of shard files per target language.
pub const SHARDS_PER_LANGUAGE: usize = 16;

/// Single hex digit selecting the shard for `original`.
/// Stable across runs so previously written shards stay reachable.
pub fn shard_key(original: &str) -> char {
    let digest = blake3::hash(original.as_bytes());
    let first = digest.as_bytes()[0] >> 4;
    char::from_digit(u32::from(first), 16).unwrap_or('0')
}

/// Path of the shard file holding `(original, tlc)` under `root`.
pub fn shard_path(root: &Path, original: &str, tlc: &str) -> PathBuf {
    root.join(tlc).join(shard_key(original).to_string())
}

/// Sibling file a shard is written to before being renamed into place.
pub(crate) fn temp_path(shard: &Path) -> PathBuf {
    let name = shard
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    shard.with_file_name(format!(".{name}.tmp"))
}

/// One exclusive lock per shard path, created lazily and never removed.
pub struct ShardLocks {
    locks: RwLock<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ShardLocks {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Lock for `path`. Concurrent first use of the same path yields the same lock.
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(path) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write();
        Arc::clone(
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ShardLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_key_is_stable_hex_digit() {
        for text in ["hello", "hello world", "こんにちは", "", "1234"] {
            let k = shard_key(text);
            assert!(k.is_ascii_hexdigit() && !k.is_ascii_uppercase());
            assert_eq!(k, shard_key(text));
        }
    }

    #[test]
    fn shard_keys_spread_over_all_shards() {
        let keys: std::collections::HashSet<char> =
            (0..2000).map(|i| shard_key(&format!("text-{i}"))).collect();
        assert_eq!(keys.len(), SHARDS_PER_LANGUAGE);
    }

    #[test]
    fn shard_path_layout() {
        let root = Path::new("/tmp/db");
        let path = shard_path(root, "hello", "ja-JP");
        assert_eq!(path.parent().unwrap(), Path::new("/tmp/db/ja-JP"));
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            shard_key("hello").to_string()
        );
        assert_eq!(
            temp_path(&path).file_name().unwrap().to_string_lossy(),
            format!(".{}.tmp", shard_key("hello"))
        );
    }

    #[test]
    fn lock_table_returns_same_lock_per_path() {
        let locks = Arc::new(ShardLocks::new());
        let path = PathBuf::from("/tmp/db/ja-JP/a");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let path = path.clone();
                std::thread::spawn(move || locks.lock_for(&path))
            })
            .collect();
        let got: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(locks.len(), 1);
        for lock in &got[1..] {
            assert!(Arc::ptr_eq(&got[0], lock));
        }
        assert!(!Arc::ptr_eq(&got[0], &locks.lock_for(Path::new("/tmp/db/ja-JP/b"))));
    }
}
