//! Message fan-out to a channel's owner and followers

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::types::OutgoingMessage;

/// Trait implemented by the chat-network adapter
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Deliver one message to one recipient
    async fn send(&self, msg: OutgoingMessage) -> Result<()>;
}

/// Sends a message to the owner and every follower of a channel
#[derive(Clone)]
pub struct Broadcaster {
    sender: Arc<dyn ChatSender>,
}

impl Broadcaster {
    pub fn new(sender: Arc<dyn ChatSender>) -> Self {
        Self { sender }
    }

    /// Send `text` to the owner first, then to each follower in stored order.
    ///
    /// A failed send is logged and skipped. Returns the number of attempted
    /// sends, owner included.
    pub async fn broadcast(&self, channel: &Channel, text: &str) -> usize {
        let recipients = std::iter::once(channel.owner).chain(channel.users.iter().copied());

        let mut attempted = 0;
        let mut failed = 0;
        for recipient in recipients {
            attempted += 1;
            if let Err(e) = self.sender.send(OutgoingMessage::new(recipient, text)).await {
                failed += 1;
                warn!(
                    "Delivery to {} via channel {} failed: {:#}",
                    recipient, channel.id, e
                );
            } else {
                debug!("Delivered to {} via channel {}", recipient, channel.id);
            }
        }

        info!(
            "Broadcast on channel {}: {} attempted, {} failed",
            channel.id, attempted, failed
        );
        attempted
    }
}

/// Decode a base64 payload, falling back to the literal text when it is not
/// valid base64 or does not decode to UTF-8
pub fn decode_payload(payload: &str) -> String {
    match STANDARD.decode(payload) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| payload.to_string()),
        Err(_) => payload.to_string(),
    }
}

/// Append the human-readable source attribution to a published message
pub fn attribute(text: &str, channel_id: &str) -> String {
    format!("{}\n\nFrom [{}]", text, channel_id)
}
