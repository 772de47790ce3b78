//! herald-gateway - HTTP surface for herald
//!
//! Serves the three publish endpoints, the Telegram webhook, and a couple of
//! plain-text status routes.

pub mod auth;
pub mod publish;
pub mod server;

pub use server::{GatewayServer, GatewayState};
