//! Shared message types for herald-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound control message from the chat network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Network message id, used to correlate the reply
    pub id: i32,
    pub sender_id: i64,
    pub sender_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Outgoing text message to a single recipient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub recipient: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<i32>, // original message id
}

impl OutgoingMessage {
    pub fn new(recipient: i64, text: impl Into<String>) -> Self {
        Self {
            recipient,
            text: text.into(),
            reply_to: None,
        }
    }

    /// Build a reply to `incoming`, addressed to its sender
    pub fn reply(incoming: &IncomingMessage, text: impl Into<String>) -> Self {
        Self {
            recipient: incoming.sender_id,
            text: text.into(),
            reply_to: Some(incoming.id),
        }
    }
}
