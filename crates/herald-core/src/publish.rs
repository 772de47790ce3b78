//! The canonical publish operation
//!
//! Every transport shape is translated into a [`PublishRequest`] and handed
//! to [`Publisher::publish`], which authorizes and then broadcasts.

use tracing::info;

use crate::auth::AuthGate;
use crate::broadcast::{self, Broadcaster};
use crate::error::{Error, Result};

/// Message body of a publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// May be base64; decoded when possible, otherwise used as-is
    Encoded(String),
    /// Used exactly as received
    Raw(String),
}

impl Payload {
    fn is_empty(&self) -> bool {
        match self {
            Self::Encoded(s) | Self::Raw(s) => s.is_empty(),
        }
    }

    fn into_text(self) -> String {
        match self {
            Self::Encoded(s) => broadcast::decode_payload(&s),
            Self::Raw(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub channel: String,
    pub token: String,
    pub payload: Payload,
}

/// Outcome of a successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Attempted sends, owner included
    pub delivered: usize,
}

impl std::fmt::Display for PublishReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ok, send to {} user", self.delivered)
    }
}

/// Authorize + broadcast
#[derive(Clone)]
pub struct Publisher {
    gate: AuthGate,
    broadcaster: Broadcaster,
}

impl Publisher {
    pub fn new(gate: AuthGate, broadcaster: Broadcaster) -> Self {
        Self { gate, broadcaster }
    }

    pub async fn publish(&self, req: PublishRequest) -> Result<PublishReceipt> {
        if req.channel.is_empty() || req.token.is_empty() || req.payload.is_empty() {
            return Err(Error::validation("need more params"));
        }

        let channel = self.gate.authorize(&req.channel, &req.token).await?;
        let text = broadcast::attribute(&req.payload.into_text(), &channel.id);
        let delivered = self.broadcaster.broadcast(&channel, &text).await;

        info!("Published to channel {} ({} recipients)", channel.id, delivered);
        Ok(PublishReceipt { delivered })
    }
}
