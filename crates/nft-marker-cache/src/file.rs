//! One-JSON-file-per-key cache store.

use crate::{Cache, CacheEntry, CacheError, Clock, Fingerprint, SystemClock, TtlPolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Directory under the storage root that holds cache entries.
pub const CACHE_DIR_NAME: &str = "nft_cache";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Cache storing each entry as `{dir}/{fingerprint}.json`.
///
/// Files are human-readable and written via a temporary file plus rename,
/// so a reader never observes a half-written entry.
pub struct JsonFileCache<V> {
    dir: PathBuf,
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
    _value: PhantomData<fn() -> V>,
}

impl<V> std::fmt::Debug for JsonFileCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileCache")
            .field("dir", &self.dir)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<V> JsonFileCache<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Cache rooted at `dir` with the default 7-day TTL and the wall clock.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            policy: TtlPolicy::default(),
            clock: Arc::new(SystemClock),
            _value: PhantomData,
        }
    }

    /// Cache at `{storage_root}/nft_cache`.
    pub fn under_storage_root(storage_root: impl AsRef<Path>) -> Self {
        Self::new(storage_root.as_ref().join(CACHE_DIR_NAME))
    }

    pub fn with_ttl(mut self, policy: TtlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read the stored entry regardless of age.
    pub fn read_entry(&self, key: &Fingerprint) -> Result<Option<CacheEntry<V>>, CacheError> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        let entry: CacheEntry<V> = serde_json::from_slice(&raw)
            .map_err(|source| CacheError::Corrupt {
                path: path.clone(),
                source,
            })?;
        if &entry.fingerprint != key {
            return Err(CacheError::KeyMismatch {
                path,
                found: entry.fingerprint.to_string(),
            });
        }
        Ok(Some(entry))
    }

    fn write_entry(&self, entry: &CacheEntry<V>) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let path = self.entry_path(&entry.fingerprint);
        let tmp = self.dir.join(format!(
            ".{}.{}-{}.tmp",
            entry.fingerprint,
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let json = serde_json::to_vec_pretty(entry).map_err(|source| CacheError::Corrupt {
            path: path.clone(),
            source,
        })?;
        fs::write(&tmp, json).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CacheError::io(&path, e)
        })
    }

    /// Delete expired and unreadable entries. Returns how many were removed.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(dir = %self.dir.display()))
    )]
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };

        let now = self.clock.now();
        let mut removed = 0;
        for item in dir {
            let path = item.map_err(|e| CacheError::io(&self.dir, e))?.path();
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|_| path.extension().is_some_and(|ext| ext == "json"))
                .and_then(Fingerprint::parse)
            else {
                continue;
            };

            let stale = match self.read_entry(&key) {
                Ok(Some(entry)) => self.policy.is_expired(entry.created_at, now),
                Ok(None) => false,
                Err(e) => {
                    log::warn!("dropping unreadable cache entry: {e}");
                    true
                }
            };
            if stale {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(CacheError::io(path, e)),
                }
            }
        }
        log::debug!("purged {removed} cache entries from {}", self.dir.display());
        Ok(removed)
    }
}

impl<V> Cache<Fingerprint, V> for JsonFileCache<V>
where
    V: Serialize + DeserializeOwned,
{
    fn get(&self, key: &Fingerprint) -> Option<V> {
        match self.read_entry(key) {
            Ok(Some(entry)) if self.policy.is_expired(entry.created_at, self.clock.now()) => {
                log::debug!("cache entry {key} expired (created {})", entry.created_at);
                None
            }
            Ok(Some(entry)) => Some(entry.payload),
            Ok(None) => None,
            Err(e) => {
                log::warn!("treating cache entry {key} as a miss: {e}");
                None
            }
        }
    }

    fn set(&self, key: &Fingerprint, value: V) -> Result<(), CacheError> {
        let entry = CacheEntry {
            fingerprint: key.clone(),
            payload: value,
            created_at: self.clock.now(),
        };
        self.write_entry(&entry)
    }
}
