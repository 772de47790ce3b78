//! Publish authorization: channel name + token validation

use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::store::ChannelStore;

/// Validates a channel id + token pair before a publish is allowed
#[derive(Clone)]
pub struct AuthGate {
    store: ChannelStore,
}

impl AuthGate {
    pub fn new(store: ChannelStore) -> Self {
        Self { store }
    }

    /// Return the channel if `supplied_token` matches its token.
    ///
    /// A missing channel and a wrong token both yield [`Error::Unauthorized`].
    /// Store failures propagate as [`Error::StoreUnavailable`].
    pub async fn authorize(&self, channel_id: &str, supplied_token: &str) -> Result<Channel> {
        let channel = self.store.get(channel_id).await?;

        match channel {
            Some(ch) if validate_token(&ch.token, supplied_token) => {
                debug!("Publish authorized for channel {}", ch.id);
                Ok(ch)
            }
            _ => {
                warn!("Publish denied for channel {}", channel_id);
                Err(Error::Unauthorized)
            }
        }
    }
}

/// Compare a supplied token against the stored one.
///
/// An empty stored token never matches.
pub fn validate_token(stored_token: &str, supplied_token: &str) -> bool {
    if stored_token.is_empty() || supplied_token.is_empty() {
        return false;
    }
    constant_time_eq(stored_token.as_bytes(), supplied_token.as_bytes())
}

/// Byte equality that reads every byte of equal-length inputs; only a length
/// mismatch returns early
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
