//! Channel persistence
//!
//! [`DocumentStore`] is the seam to whatever keyed record store backs the
//! relay. [`ChannelStore`] sits on top of it and owns the `Channel` record
//! lifecycle: serialization, the create-if-absent rule, and error mapping.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::channel::Channel;
use crate::error::{Error, Result};

/// Failure reported by a [`DocumentStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    AlreadyExists,

    #[error("store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn unavailable(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unavailable(source.into())
    }
}

/// Keyed JSON document storage
///
/// `get` returns `Ok(None)` for a missing record; `Err` always means the store
/// itself failed. `create_if_absent` must check and insert atomically.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> std::result::Result<Option<Value>, StoreError>;

    /// All records, ordered by id
    async fn list(&self) -> std::result::Result<Vec<Value>, StoreError>;

    async fn create_if_absent(&self, id: &str, record: Value) -> std::result::Result<(), StoreError>;

    /// Overwrite (or insert) the record stored under `id`
    async fn update(&self, id: &str, record: Value) -> std::result::Result<(), StoreError>;

    async fn delete(&self, id: &str) -> std::result::Result<(), StoreError>;
}

/// CRUD façade for `Channel` records
#[derive(Clone)]
pub struct ChannelStore {
    docs: Arc<dyn DocumentStore>,
}

impl ChannelStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    /// Look up a channel; `Ok(None)` when it does not exist
    pub async fn get(&self, id: &str) -> Result<Option<Channel>> {
        let record = self.docs.get(id).await.map_err(|e| {
            error!("Failed to fetch channel {}: {}", id, e);
            Error::from(e)
        })?;

        record.map(|value| decode(id, value)).transpose()
    }

    /// Every stored channel. A corrupt record fails the whole listing, as it does for `get`.
    pub async fn list(&self) -> Result<Vec<Channel>> {
        let records = self.docs.list().await.map_err(|e| {
            error!("Failed to list channels: {}", e);
            Error::from(e)
        })?;

        let channels = records
            .into_iter()
            .map(|value| {
                let id = value
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("<unknown>")
                    .to_string();
                decode(&id, value)
            })
            .collect::<Result<Vec<Channel>>>()?;

        debug!("Listed {} channels", channels.len());
        Ok(channels)
    }

    /// Insert a new channel. Fails with [`Error::AlreadyExists`] if the id is taken,
    /// leaving the existing record untouched.
    pub async fn create(&self, channel: &Channel) -> Result<()> {
        if channel.token.is_empty() {
            return Err(Error::validation("channel token can't empty"));
        }

        // create_if_absent below is the authoritative check
        if self.get(&channel.id).await?.is_some() {
            return Err(Error::AlreadyExists);
        }

        self.docs
            .create_if_absent(&channel.id, encode(channel)?)
            .await
            .map_err(|e| {
                if !matches!(e, StoreError::AlreadyExists) {
                    error!("Failed to create channel {}: {}", channel.id, e);
                }
                Error::from(e)
            })?;

        info!("Created channel {} (owner {})", channel.id, channel.owner);
        Ok(())
    }

    /// Persist a modified channel (last writer wins)
    pub async fn update(&self, channel: &Channel) -> Result<()> {
        self.docs
            .update(&channel.id, encode(channel)?)
            .await
            .map_err(|e| {
                error!("Failed to update channel {}: {}", channel.id, e);
                Error::from(e)
            })?;

        debug!("Updated channel {} ({} followers)", channel.id, channel.users.len());
        Ok(())
    }

    /// Delete a channel record (administrative escape hatch)
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.docs.delete(id).await.map_err(|e| {
            error!("Failed to remove channel {}: {}", id, e);
            Error::from(e)
        })?;

        info!("Removed channel {}", id);
        Ok(())
    }
}

fn encode(channel: &Channel) -> Result<Value> {
    serde_json::to_value(channel).map_err(|e| Error::StoreUnavailable(StoreError::unavailable(e)))
}

fn decode(id: &str, value: Value) -> Result<Channel> {
    serde_json::from_value(value).map_err(|e| {
        error!("Channel record {} is corrupt: {}", id, e);
        Error::StoreUnavailable(StoreError::unavailable(e))
    })
}
