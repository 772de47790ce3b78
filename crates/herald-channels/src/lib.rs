//! Chat-network adapter and message bus for herald
//!
//! This crate provides the inbound message bus and the Telegram adapter that
//! delivers broadcasts and replies.

pub mod bus;
pub mod telegram;

// Re-export main types
pub use bus::{BusSender, MessageBus};
pub use telegram::{TelegramChannel, parse_update};
