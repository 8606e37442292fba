//! Redis-backed result store, shared across processes.
//!
//! TTL is enforced by Redis itself via `SET .. EX`, which gives the same
//! observable semantics as the in-memory store. The connection is opened
//! lazily on first use so construction never touches the network.

use ::redis::{Client, aio::ConnectionManager};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{CacheError, ResultStore};
use crate::error::ConfigurationError;
use crate::models::envelope::QueryResult;

#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: std::sync::Arc<OnceCell<ConnectionManager>>,
    key_prefix: String,
}

impl RedisStore {
    /// Validates the URL; does not connect.
    pub fn open(url: &str, key_prefix: impl Into<String>) -> Result<Self, ConfigurationError> {
        let client = Client::open(url).map_err(|e| ConfigurationError::Cache(e.to_string()))?;
        Ok(Self {
            client,
            connection: std::sync::Arc::new(OnceCell::new()),
            key_prefix: key_prefix.into(),
        })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                info!("connecting to redis cache");
                ConnectionManager::new(self.client.clone()).await
            })
            .await
            .map_err(|e| CacheError::Store(e.to_string()))?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl ResultStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<QueryResult>, CacheError> {
        let full_key = self.make_key(key);
        debug!("getting cache key: {full_key}");

        let mut conn = self.connection().await?;
        let value: Option<String> = ::redis::cmd("GET")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Store(e.to_string()))?;

        value.as_deref().map(decode).transpose()
    }

    async fn put(&self, key: &str, value: &QueryResult, ttl: Duration) -> Result<(), CacheError> {
        let full_key = self.make_key(key);
        let serialized = encode(value)?;
        // EX takes whole seconds and rejects zero.
        let ttl_secs = ttl.as_secs().max(1);
        debug!("setting cache key: {full_key} with TTL: {ttl_secs}s");

        let mut conn = self.connection().await?;
        let _: () = ::redis::cmd("SET")
            .arg(&full_key)
            .arg(serialized)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Store(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        if self.key_prefix.is_empty() {
            warn!("no key prefix configured, refusing to clear redis cache");
            return Err(CacheError::Store(
                "cannot clear cache without key prefix".to_string(),
            ));
        }
        let pattern = format!("{}*", self.key_prefix);
        let mut conn = self.connection().await?;
        let keys: Vec<String> = ::redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Store(e.to_string()))?;
        if keys.is_empty() {
            return Ok(());
        }
        let count = keys.len();
        let _: () = ::redis::cmd("DEL")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Store(e.to_string()))?;
        info!("cleared {count} cache keys matching {pattern}");
        Ok(())
    }
}

fn encode(value: &QueryResult) -> Result<String, CacheError> {
    Ok(serde_json::to_string(value)?)
}

fn decode(raw: &str) -> Result<QueryResult, CacheError> {
    Ok(serde_json::from_str(raw)?)
}
