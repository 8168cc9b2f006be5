//! Redis-backed session cache.
//!
//! One JSON document per username, stored as the whole value at that key:
//! `{"name_id": ..., "saml_attrs": {...}, "session_index": ...}`.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::SessionCache;
use super::config::CacheSpec;
use super::types::{CacheError, CacheKind, SessionEntry};

/// Upper bound for a single store round-trip unless `timeout-secs` is set.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Session cache stored in an external redis server.
pub struct RemoteCache {
    client: redis::Client,
    key_prefix: String,
    op_timeout: Duration,
}

impl RemoteCache {
    /// Build the client from the spec's connection parameters.
    ///
    /// Does not contact the server.
    pub fn connect(spec: &CacheSpec) -> Result<Self, CacheError> {
        let url = spec.redis_url()?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| CacheError::Backend(format!("invalid redis url {}: {}", url, e)))?;
        let op_timeout = spec.operation_timeout().unwrap_or(DEFAULT_OPERATION_TIMEOUT);

        debug!(url = %url, timeout = ?op_timeout, "Redis session cache configured");

        Ok(Self {
            client,
            key_prefix: spec.key_prefix.clone(),
            op_timeout,
        })
    }

    fn key(&self, username: &str) -> String {
        format!("{}{}", self.key_prefix, username)
    }

    /// Opened per operation, so a restarted server only fails the call in flight.
    async fn conn(&self) -> Result<MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| CacheError::Backend(format!("operation timed out after {:?}", self.op_timeout)))?
    }
}

#[async_trait]
impl SessionCache for RemoteCache {
    async fn upsert(&self, username: &str, entry: SessionEntry) -> Result<(), CacheError> {
        let payload = encode_entry(&entry)?;
        let key = self.key(username);

        self.bounded(async {
            let mut conn = self.conn().await?;
            conn.set::<_, _, ()>(&key, payload)
                .await
                .map_err(backend_error)
        })
        .await?;

        debug!(username = %username, "Stored session entry in redis");
        Ok(())
    }

    async fn get(&self, username: &str) -> Result<SessionEntry, CacheError> {
        let key = self.key(username);

        let value: Option<String> = self
            .bounded(async {
                let mut conn = self.conn().await?;
                conn.get(&key).await.map_err(backend_error)
            })
            .await?;

        match value {
            Some(document) => decode_entry(username, &document),
            None => {
                warn!(username = %username, "No session entry for user");
                Ok(SessionEntry::default())
            }
        }
    }

    async fn remove(&self, username: &str) -> Result<(), CacheError> {
        let key = self.key(username);

        let removed: i64 = self
            .bounded(async {
                let mut conn = self.conn().await?;
                conn.del(&key).await.map_err(backend_error)
            })
            .await?;

        if removed == 0 {
            warn!(username = %username, "No session entry to remove");
        }
        Ok(())
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Remote
    }
}

fn backend_error(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

/// Serialize an entry into its stored document.
pub fn encode_entry(entry: &SessionEntry) -> Result<String, CacheError> {
    serde_json::to_string(entry).map_err(|e| CacheError::Backend(format!("encode failed: {}", e)))
}

/// Parse a stored document. Every field must be present.
pub fn decode_entry(username: &str, document: &str) -> Result<SessionEntry, CacheError> {
    serde_json::from_str(document).map_err(|e| CacheError::Corrupt {
        username: username.to_string(),
        reason: e.to_string(),
    })
}
