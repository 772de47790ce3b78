//! herald-core - channel model and relay logic
//!
//! This crate provides:
//! - The `Channel` entity, name validation and token generation
//! - `ChannelStore` over a pluggable `DocumentStore`
//! - Membership edits (follow, unfollow, kick)
//! - `AuthGate` for token-protected publishing
//! - `Broadcaster` fan-out through a `ChatSender`
//! - `Publisher`, the single publish operation every transport calls
//! - `CommandRouter` for chat control messages

pub mod auth;
pub mod broadcast;
pub mod channel;
pub mod command;
pub mod error;
pub mod membership;
pub mod memory;
pub mod publish;
pub mod store;
pub mod types;

pub use auth::AuthGate;
pub use broadcast::{Broadcaster, ChatSender};
pub use channel::Channel;
pub use command::CommandRouter;
pub use error::{Error, ErrorKind, Result};
pub use memory::MemoryDocumentStore;
pub use publish::{Payload, PublishReceipt, PublishRequest, Publisher};
pub use store::{ChannelStore, DocumentStore, StoreError};
pub use types::{IncomingMessage, OutgoingMessage};
