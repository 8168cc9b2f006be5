//! Session cache contract and the process-local backends.
//!
//! The cache is keyed by platform username. It is written when an assertion
//! is consumed and read once more when the user logs out, so the SAML
//! NameID and SessionIndex survive between otherwise stateless requests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use super::config::CacheSpec;
use super::remote::RemoteCache;
use super::types::{CacheError, CacheKind, SessionEntry};

/// Storage for the SAML identifiers of logged-in users.
///
/// `get` never fails on a miss: it returns `SessionEntry::default()`.
/// `remove` on a missing key is a no-op.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Insert or replace the entry for `username`.
    async fn upsert(&self, username: &str, entry: SessionEntry) -> Result<(), CacheError>;

    /// Fetch the entry for `username`, or the empty sentinel.
    async fn get(&self, username: &str) -> Result<SessionEntry, CacheError>;

    /// Drop the entry for `username` if there is one.
    async fn remove(&self, username: &str) -> Result<(), CacheError>;

    /// Backend kind, for logging.
    fn kind(&self) -> CacheKind;
}

/// Cache that stores nothing.
#[derive(Debug, Default)]
pub struct DisabledCache;

#[async_trait]
impl SessionCache for DisabledCache {
    async fn upsert(&self, _username: &str, _entry: SessionEntry) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, _username: &str) -> Result<SessionEntry, CacheError> {
        Ok(SessionEntry::default())
    }

    async fn remove(&self, _username: &str) -> Result<(), CacheError> {
        Ok(())
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Disabled
    }
}

/// Process-local cache. Entries live until removed; nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, SessionEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionCache for InMemoryCache {
    async fn upsert(&self, username: &str, entry: SessionEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;

        if entries.contains_key(username) {
            warn!(username = %username, name_id = %entry.name_id, "Replacing existing session entry");
        } else {
            info!(username = %username, "Inserting session entry");
        }

        entries.insert(username.to_string(), entry);
        Ok(())
    }

    async fn get(&self, username: &str) -> Result<SessionEntry, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;

        match entries.get(username) {
            Some(entry) => Ok(entry.clone()),
            None => {
                warn!(username = %username, "No session entry for user");
                Ok(SessionEntry::default())
            }
        }
    }

    async fn remove(&self, username: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;

        if entries.remove(username).is_none() {
            warn!(username = %username, "No session entry to remove");
        } else {
            debug!(username = %username, "Removed session entry");
        }
        Ok(())
    }

    fn kind(&self) -> CacheKind {
        CacheKind::InMemory
    }
}

/// Build the cache selected by `spec`.
///
/// Fails on an unknown backend name, or when the remote backend is missing
/// its connection parameters.
pub fn create(spec: &CacheSpec) -> Result<Arc<dyn SessionCache>, CacheError> {
    let cache: Arc<dyn SessionCache> = match spec.kind()? {
        CacheKind::Disabled => Arc::new(DisabledCache),
        CacheKind::InMemory => Arc::new(InMemoryCache::new()),
        CacheKind::Remote => Arc::new(RemoteCache::connect(spec)?),
    };

    info!(backend = %cache.kind(), "Session cache created");
    Ok(cache)
}
