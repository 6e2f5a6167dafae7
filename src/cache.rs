use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use sha2::{Digest as _, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Cache file name for a client IP: a fixed-length hex digest, so identical
/// IPs always map to the same file and the name leaks nothing about the IP's
/// shape.
pub fn cache_file_name(ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    format!("video_{:x}.mp4", hasher.finalize())
}

/// On-disk video cache. Existence of the file is the hit signal; there is no
/// TTL, no invalidation and no metadata.
///
/// `lock_key` hands out a per-key async mutex so at most one generation runs
/// per cache file; concurrent requesters for the same uncached key await the
/// in-flight generation and then observe the fresh file on re-check. Lock
/// entries are never evicted, mirroring the cache directory itself.
pub struct VideoCache {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl VideoCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, ip: &str) -> PathBuf {
        self.dir.join(cache_file_name(ip))
    }

    /// `Some(path)` when a finished video for `ip` is already on disk.
    pub fn lookup(&self, ip: &str) -> Option<PathBuf> {
        let path = self.path_for(ip);
        path.is_file().then_some(path)
    }

    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let entry = self
                .locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_deterministic() {
        assert_eq!(cache_file_name("1.2.3.4"), cache_file_name("1.2.3.4"));
    }

    #[test]
    fn file_name_has_fixed_length_regardless_of_input() {
        let short = cache_file_name("::1");
        let long = cache_file_name("2001:0db8:85a3:0000:0000:8a2e:0370:7334");
        // "video_" + 64 hex chars + ".mp4"
        assert_eq!(short.len(), 6 + 64 + 4);
        assert_eq!(short.len(), long.len());
        assert!(short.starts_with("video_") && short.ends_with(".mp4"));
    }

    #[test]
    fn distinct_ips_get_distinct_names() {
        assert_ne!(cache_file_name("1.2.3.4"), cache_file_name("1.2.3.5"));
    }

    #[test]
    fn lookup_misses_until_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VideoCache::new(dir.path());
        assert!(cache.lookup("1.2.3.4").is_none());

        std::fs::write(cache.path_for("1.2.3.4"), b"mp4").unwrap();
        assert_eq!(cache.lookup("1.2.3.4"), Some(cache.path_for("1.2.3.4")));
    }

    #[tokio::test]
    async fn same_key_serializes_waiters() {
        let cache = Arc::new(VideoCache::new("unused"));
        let guard = cache.lock_key("k").await;

        let contender = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let _g = cache.lock_key("k").await;
            })
        };
        // The contender cannot finish while the guard is held.
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let cache = VideoCache::new("unused");
        let _a = cache.lock_key("a").await;
        // Must not deadlock.
        let _b = cache.lock_key("b").await;
    }
}
