//! The key-value store backing the randomizer. Kept behind a small trait so
//! the refresh loop is testable without a real Redis instance.

use async_trait::async_trait;
use bytes::Bytes;
use displaydoc::Display;
use redis::{AsyncCommands, IntoConnectionInfo};
use thiserror::Error;

use crate::config::randomizer::RandomizerConfig;

#[derive(Debug, Error, Display)]
pub enum StoreError {
    /// key-value store connection error: {0}
    Connection(#[from] redis::RedisError),
}

#[async_trait]
pub trait ReleaseStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;
}

pub struct RedisReleaseStore {
    client: redis::Client,
}

impl RedisReleaseStore {
    pub fn new(config: &RandomizerConfig) -> Result<Self, crate::error::InitError> {
        let mut connection_info = config
            .kv_host
            .expose()
            .as_str()
            .into_connection_info()
            .map_err(crate::error::InitError::ReleaseStore)?;
        connection_info.redis.db = config.kv_db;
        if !config.kv_password.expose().is_empty() {
            connection_info.redis.password = Some(config.kv_password.expose().clone());
        }
        let client = redis::Client::open(connection_info)
            .map_err(crate::error::InitError::ReleaseStore)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReleaseStore for RedisReleaseStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.map(Bytes::from))
    }
}

#[cfg(test)]
pub struct InMemoryReleaseStore {
    pub entries: std::collections::HashMap<String, Bytes>,
}

#[cfg(test)]
#[async_trait]
impl ReleaseStore for InMemoryReleaseStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }
}
