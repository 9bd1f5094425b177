use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::spawn_blocking;

use crate::error::{ChronoError, Result};

use super::{KvBackend, KvKey, KvNamespace, NamespaceCache};

pub struct SledBackend {
    db: Arc<sled::Db>,
    cache: Arc<NamespaceCache>,
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|err| ChronoError::Cache(format!("unable to open sled db: {err}")))?;
        Ok(Self::from_db(db))
    }

    /// In-memory database discarded on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|err| ChronoError::Cache(format!("unable to open temporary db: {err}")))?;
        Ok(Self::from_db(db))
    }

    pub fn from_db(db: sled::Db) -> Self {
        Self {
            db: Arc::new(db),
            cache: Arc::new(NamespaceCache::new()),
        }
    }

    async fn tree(&self, namespace: KvNamespace) -> Result<sled::Tree> {
        let db = self.db.clone();
        let cache = self.cache.clone();
        spawn_blocking(move || cache.get_or_insert(&db, namespace))
            .await
            .map_err(|err| ChronoError::Cache(format!("task join error: {err}")))?
    }
}

#[async_trait]
impl KvBackend for SledBackend {
    async fn get(&self, key: &KvKey) -> Result<Option<Vec<u8>>> {
        let tree = self.tree(key.namespace).await?;
        let key_bytes = key.key.clone();
        spawn_blocking(move || {
            tree.get(key_bytes.as_bytes())
                .map(|opt| opt.map(|ivec| ivec.as_ref().to_vec()))
                .map_err(|err| ChronoError::Cache(err.to_string()))
        })
        .await
        .map_err(|err| ChronoError::Cache(format!("task join error: {err}")))?
    }

    async fn put(&self, key: &KvKey, value: Vec<u8>) -> Result<()> {
        let tree = self.tree(key.namespace).await?;
        let key_bytes = key.key.clone();
        spawn_blocking(move || {
            tree.insert(key_bytes.as_bytes(), value)
                .map(|_| ())
                .map_err(|err| ChronoError::Cache(err.to_string()))
        })
        .await
        .map_err(|err| ChronoError::Cache(format!("task join error: {err}")))?
    }

    async fn delete(&self, key: &KvKey) -> Result<()> {
        let tree = self.tree(key.namespace).await?;
        let key_bytes = key.key.clone();
        spawn_blocking(move || {
            tree.remove(key_bytes.as_bytes())
                .map(|_| ())
                .map_err(|err| ChronoError::Cache(err.to_string()))
        })
        .await
        .map_err(|err| ChronoError::Cache(format!("task join error: {err}")))?
    }

    async fn clear(&self, namespace: KvNamespace) -> Result<()> {
        let tree = self.tree(namespace).await?;
        spawn_blocking(move || {
            tree.clear()
                .map_err(|err| ChronoError::Cache(err.to_string()))?;
            tree.flush()
                .map(|_| ())
                .map_err(|err| ChronoError::Cache(err.to_string()))
        })
        .await
        .map_err(|err| ChronoError::Cache(format!("task join error: {err}")))?
    }

    async fn len(&self, namespace: KvNamespace) -> Result<usize> {
        let tree = self.tree(namespace).await?;
        spawn_blocking(move || tree.len())
            .await
            .map_err(|err| ChronoError::Cache(format!("task join error: {err}")))
    }

    async fn flush(&self) -> Result<()> {
        let db = self.db.clone();
        spawn_blocking(move || {
            db.flush()
                .map(|_| ())
                .map_err(|err| ChronoError::Cache(err.to_string()))
        })
        .await
        .map_err(|err| ChronoError::Cache(format!("task join error: {err}")))?
    }
}
