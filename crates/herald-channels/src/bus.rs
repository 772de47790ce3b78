//! Message bus between the chat network and the command loop

use anyhow::Result;
use herald_core::broadcast::ChatSender;
use herald_core::types::{IncomingMessage, OutgoingMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Inbound control messages plus the outbound path for replies
///
/// The webhook endpoint pushes parsed updates through [`MessageBus::inbound`];
/// the command loop takes the receiver from [`MessageBus::split`] and answers
/// through the [`BusSender`].
pub struct MessageBus {
    outbound: Arc<dyn ChatSender>,
    incoming_tx: mpsc::Sender<IncomingMessage>,
    incoming_rx: mpsc::Receiver<IncomingMessage>,
}

impl MessageBus {
    /// Create a new message bus with the specified buffer size for incoming messages
    pub fn new(buffer_size: usize, outbound: Arc<dyn ChatSender>) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        info!("Created message bus with buffer size {}", buffer_size);
        Self {
            outbound,
            incoming_tx: tx,
            incoming_rx: rx,
        }
    }

    /// Producer handle for inbound messages
    pub fn inbound(&self) -> mpsc::Sender<IncomingMessage> {
        self.incoming_tx.clone()
    }

    /// Split the bus into a receiver and a sender handle.
    /// The receiver goes into a select! loop while the sender is cloned into
    /// spawned tasks that deliver replies.
    ///
    /// The bus keeps no producer of its own after the split; the channel
    /// closes when the last [`MessageBus::inbound`] handle is dropped.
    pub fn split(self) -> (mpsc::Receiver<IncomingMessage>, BusSender) {
        let sender = BusSender {
            outbound: self.outbound,
        };
        (self.incoming_rx, sender)
    }
}

/// Send-only handle for the message bus
#[derive(Clone)]
pub struct BusSender {
    outbound: Arc<dyn ChatSender>,
}

impl BusSender {
    pub async fn send(&self, msg: OutgoingMessage) -> Result<()> {
        debug!("Routing outgoing message to {}", msg.recipient);
        self.outbound.send(msg).await
    }
}
