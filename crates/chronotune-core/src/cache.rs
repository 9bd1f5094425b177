use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::FileFingerprint;
use crate::error::Result;
use crate::kv::{KvBackend, KvKey, KvNamespace, KvStore, SledBackend};
use crate::resolution::YearSource;
use crate::year::Year;

/// Persisted result of an earlier successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub year: Year,
    /// Source that originally produced the year.
    pub source: YearSource,
    pub timestamp: DateTime<Utc>,
}

/// Fingerprint to year store; lookups never leave the local database.
pub struct CacheStore<B: KvBackend> {
    store: KvStore<B>,
    degraded: bool,
}

impl CacheStore<SledBackend> {
    /// Opens the on-disk cache. An unreadable or corrupt database is replaced by an
    /// empty in-memory one for this run and reported through `is_degraded`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match SledBackend::open(path) {
            Ok(backend) => Ok(Self::new(Arc::new(backend))),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "cache store unreadable, continuing with an empty cache"
                );
                let mut cache = Self::new(Arc::new(SledBackend::temporary()?));
                cache.degraded = true;
                Ok(cache)
            }
        }
    }

    /// Leaves an empty, readable cache at `path`. A store that cannot be opened is
    /// deleted and recreated rather than replaced in memory.
    pub async fn reset(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let backend = match SledBackend::open(path) {
            Ok(backend) => backend,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cache store unreadable, recreating it");
                remove_store(path).await?;
                SledBackend::open(path)?
            }
        };
        let cache = Self::new(Arc::new(backend));
        cache.clear().await?;
        cache.flush().await?;
        Ok(cache)
    }
}

async fn remove_store(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await?,
        Ok(_) => tokio::fs::remove_file(path).await?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

impl<B: KvBackend> CacheStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            store: KvStore::new(backend),
            degraded: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn key(fingerprint: &FileFingerprint) -> KvKey {
        KvKey::new(KvNamespace::Resolution, fingerprint.as_str())
    }

    /// Returns the cached entry. Unreadable records count as misses and are dropped
    /// so the next successful resolution replaces them.
    pub async fn lookup(&self, fingerprint: &FileFingerprint) -> Option<CacheEntry> {
        let key = Self::key(fingerprint);
        match self.store.load::<CacheEntry>(&key).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%fingerprint, error = %err, "ignoring unreadable cache entry");
                if let Err(err) = self.store.remove(&key).await {
                    debug!(%fingerprint, error = %err, "could not drop unreadable entry");
                }
                None
            }
        }
    }

    /// Last write wins.
    pub async fn store(
        &self,
        fingerprint: &FileFingerprint,
        year: Year,
        source: YearSource,
    ) -> Result<()> {
        let entry = CacheEntry {
            year,
            source,
            timestamp: Utc::now(),
        };
        debug!(%fingerprint, %year, %source, "caching resolution");
        self.store.store(&Self::key(fingerprint), &entry).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.backend().clear(KvNamespace::Resolution).await
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.backend().len(KvNamespace::Resolution).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.store.backend().flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};

    use crate::audio::{AudioFile, AudioFormat};

    fn fingerprint(name: &str) -> FileFingerprint {
        AudioFile {
            path: PathBuf::from(name),
            format: AudioFormat::Flac,
            size: 42,
            modified: UNIX_EPOCH + Duration::from_secs(1),
        }
        .fingerprint()
    }

    fn year(value: u16) -> Year {
        Year::new(value).unwrap()
    }

    #[tokio::test]
    async fn store_then_lookup_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path().join("cache")).unwrap();
        let fp = fingerprint("/music/a.flac");

        assert!(cache.lookup(&fp).await.is_none());
        cache.store(&fp, year(1994), YearSource::Metadata).await.unwrap();
        let entry = cache.lookup(&fp).await.expect("hit");
        assert_eq!(entry.year, year(1994));
        assert_eq!(entry.source, YearSource::Metadata);

        cache.store(&fp, year(2001), YearSource::External).await.unwrap();
        let entry = cache.lookup(&fp).await.expect("hit");
        assert_eq!(entry.year, year(2001));
        assert_eq!(entry.source, YearSource::External);
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        let fp = fingerprint("/music/b.flac");
        {
            let cache = CacheStore::open(&path).unwrap();
            cache.store(&fp, year(1980), YearSource::Filename).await.unwrap();
            cache.flush().await.unwrap();
        }
        let cache = CacheStore::open(&path).unwrap();
        assert_eq!(cache.lookup(&fp).await.map(|e| e.year), Some(year(1980)));
    }

    #[tokio::test]
    async fn clear_on_empty_store_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path().join("cache")).unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 0);

        cache
            .store(&fingerprint("/x.flac"), year(2000), YearSource::Metadata)
            .await
            .unwrap();
        cache.clear().await.unwrap();
        assert!(cache.lookup(&fingerprint("/x.flac")).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_store_degrades_to_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        // A plain file where the database directory should be.
        std::fs::write(&path, b"not a sled database").unwrap();

        let cache = CacheStore::open(&path).expect("must not fail");
        assert!(cache.is_degraded());
        let fp = fingerprint("/music/c.flac");
        assert!(cache.lookup(&fp).await.is_none());
        cache.store(&fp, year(1999), YearSource::Metadata).await.unwrap();
        assert!(cache.lookup(&fp).await.is_some());
    }

    #[tokio::test]
    async fn reset_replaces_a_corrupt_store_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        std::fs::write(&path, b"not a sled database").unwrap();

        {
            let cache = CacheStore::reset(&path).await.expect("reset");
            assert!(!cache.is_degraded());
            assert_eq!(cache.len().await.unwrap(), 0);
        }
        let reopened = CacheStore::open(&path).unwrap();
        assert!(!reopened.is_degraded());
    }

    #[tokio::test]
    async fn reset_empties_a_healthy_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        {
            let cache = CacheStore::open(&path).unwrap();
            cache
                .store(&fingerprint("/music/e.flac"), year(1991), YearSource::Metadata)
                .await
                .unwrap();
            cache.flush().await.unwrap();
        }
        let cache = CacheStore::reset(&path).await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreadable_record_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(SledBackend::open(dir.path()).unwrap());
        let fp = fingerprint("/music/d.flac");
        backend
            .put(
                &KvKey::new(KvNamespace::Resolution, fp.as_str()),
                b"{garbage".to_vec(),
            )
            .await
            .unwrap();

        let cache = CacheStore::new(backend);
        assert!(cache.lookup(&fp).await.is_none());
        assert_eq!(cache.len().await.unwrap(), 0);
    }
}
