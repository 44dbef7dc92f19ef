//! Canvas persistence over a key-value backend.
//!
//! Each map's canvas is one value under `canvas:<map_ident>`, holding the
//! JSON-encoded pixel array. The adapter is a thin read/replace wrapper:
//! no locking, no transactions, eventual consistency is the backend's
//! problem. The backend is injected so tests and offline mode run against
//! process memory instead of Redis.

use std::collections::HashMap;
use std::sync::Arc;

use easel_core::{MapIdent, Pixel};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Failures from the persistence layer. Kept distinct from validation
/// failures; clients only ever see a generic storage message.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("redis error: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("canvas payload is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<RwLock<HashMap<String, String>>>),
    /// Test double: every operation fails with a backend error.
    #[cfg(test)]
    Failing,
    /// Test double: every operation panics.
    #[cfg(test)]
    Panicking,
}

#[derive(Clone)]
pub struct CanvasStore {
    backend: Backend,
}

impl CanvasStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            backend: Backend::Redis(manager),
        })
    }

    /// Process-local store for offline mode and tests.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(RwLock::new(HashMap::new()))),
        }
    }

    /// Store whose backend is down: every call returns a backend error.
    #[cfg(test)]
    pub(crate) fn failing() -> Self {
        Self {
            backend: Backend::Failing,
        }
    }

    /// Store whose backend panics, for exercising handler panic recovery.
    #[cfg(test)]
    pub(crate) fn panicking() -> Self {
        Self {
            backend: Backend::Panicking,
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::Redis(_))
    }

    fn canvas_key(map_ident: &MapIdent) -> String {
        format!("canvas:{}", map_ident)
    }

    /// Loads the stored canvas. An absent key is an empty canvas, not an
    /// error.
    pub async fn load(&self, map_ident: &MapIdent) -> Result<Vec<Pixel>, StorageError> {
        match self.load_raw(map_ident).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the stored canvas wholesale.
    pub async fn save(&self, map_ident: &MapIdent, pixels: &[Pixel]) -> Result<(), StorageError> {
        let key = Self::canvas_key(map_ident);
        let value = serde_json::to_string(pixels)?;
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                conn.set::<_, _, ()>(&key, value).await?;
            }
            Backend::Memory(entries) => {
                entries.write().await.insert(key, value);
            }
            #[cfg(test)]
            Backend::Failing => return Err(backend_down()),
            #[cfg(test)]
            Backend::Panicking => panic!("canvas store panicked"),
        }
        debug!(map = %map_ident, pixels = pixels.len(), "canvas saved");
        Ok(())
    }

    /// Distinguishes a never-written map (`None`) from an empty one for the
    /// HTTP status route.
    pub async fn pixel_count(&self, map_ident: &MapIdent) -> Result<Option<usize>, StorageError> {
        match self.load_raw(map_ident).await? {
            Some(json) => {
                let pixels: Vec<Pixel> = serde_json::from_str(&json)?;
                Ok(Some(pixels.len()))
            }
            None => Ok(None),
        }
    }

    async fn load_raw(&self, map_ident: &MapIdent) -> Result<Option<String>, StorageError> {
        let key = Self::canvas_key(map_ident);
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                Ok(conn.get::<_, Option<String>>(&key).await?)
            }
            Backend::Memory(entries) => Ok(entries.read().await.get(&key).cloned()),
            #[cfg(test)]
            Backend::Failing => Err(backend_down()),
            #[cfg(test)]
            Backend::Panicking => panic!("canvas store panicked"),
        }
    }
}

#[cfg(test)]
fn backend_down() -> StorageError {
    StorageError::Backend(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "store offline",
    )))
}
