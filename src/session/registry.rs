//! Holder for the one active session cache.
//!
//! Startup creates a cache from configuration and registers it once. Request
//! handlers call [`CacheRegistry::get`] per request instead of keeping their
//! own reference, so the registry stays the single source of truth.

use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use super::cache::SessionCache;
use super::config::CacheSpec;
use super::types::CacheError;

/// Slot holding the active cache: unregistered until [`register`](Self::register).
#[derive(Default)]
pub struct CacheRegistry {
    active: RwLock<Option<Arc<dyn SessionCache>>>,
}

impl CacheRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `cache` already registered.
    pub fn with_cache(cache: Arc<dyn SessionCache>) -> Self {
        Self {
            active: RwLock::new(Some(cache)),
        }
    }

    /// Create the cache described by `spec` and register it.
    pub fn from_spec(spec: &CacheSpec) -> Result<Self, CacheError> {
        let cache = super::cache::create(spec)?;
        Ok(Self::with_cache(cache))
    }

    /// Make `cache` the active cache. The last registration wins.
    pub fn register(&self, cache: Arc<dyn SessionCache>) -> Result<(), CacheError> {
        let mut active = self.active.write().map_err(|_| CacheError::LockPoisoned)?;
        if let Some(previous) = active.as_ref() {
            warn!(
                previous = %previous.kind(),
                replacement = %cache.kind(),
                "Replacing registered session cache"
            );
        } else {
            info!(backend = %cache.kind(), "Session cache registered");
        }
        *active = Some(cache);
        Ok(())
    }

    /// The active cache, or `CacheError::NotRegistered`.
    pub fn get(&self) -> Result<Arc<dyn SessionCache>, CacheError> {
        self.active
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .as_ref()
            .map(Arc::clone)
            .ok_or(CacheError::NotRegistered)
    }

    /// Whether a cache has been registered.
    pub fn is_registered(&self) -> bool {
        self.active.read().map(|a| a.is_some()).unwrap_or(false)
    }
}
