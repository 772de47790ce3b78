//! Telegram adapter using the Bot API in webhook mode

use anyhow::{Context, Result};
use async_trait::async_trait;
use herald_core::broadcast::ChatSender;
use herald_core::types::{IncomingMessage, OutgoingMessage};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ReplyParameters, Update, UpdateKind};
use tracing::{debug, info, warn};
use url::Url;

/// Telegram rejects text messages longer than this
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram bot connection, used for outbound sends and webhook setup
#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    /// Build a bot client for `token`, optionally against a non-default Bot API endpoint
    pub fn new(token: &str, api_url: Option<&str>) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Telegram HTTP client")?;
        let mut bot = Bot::with_client(token, client);

        if let Some(api_url) = api_url {
            let url = Url::parse(api_url)
                .with_context(|| format!("Invalid Telegram API url: {}", api_url))?;
            bot = bot.set_api_url(url);
        }

        Ok(Self { bot })
    }

    /// Verify the token with `getMe` and return the bot username
    pub async fn connect(&self) -> Result<String> {
        let me = self
            .bot
            .get_me()
            .await
            .context("Telegram getMe failed (check bot_token)")?;
        let username = me.username.clone().unwrap_or_default();
        info!("Telegram bot connected as @{}", username);
        Ok(username)
    }

    /// Point Telegram at our webhook endpoint.
    ///
    /// Any error Telegram last recorded for the webhook is logged, not returned.
    pub async fn register_webhook(&self, url: Url, secret: Option<&str>) -> Result<()> {
        let mut req = self.bot.set_webhook(url.clone());
        if let Some(secret) = secret {
            req = req.secret_token(secret.to_string());
        }
        req.await
            .with_context(|| format!("Failed to set Telegram webhook to {}", url))?;
        info!("Telegram webhook set to {}", url);

        match self.bot.get_webhook_info().await {
            Ok(info) => {
                if let Some(err) = info.last_error_message {
                    warn!("Telegram reports last webhook error: {}", err);
                }
                debug!("Webhook pending updates: {}", info.pending_update_count);
            }
            Err(e) => warn!("Failed to fetch webhook info: {}", e),
        }
        Ok(())
    }
}

#[async_trait]
impl ChatSender for TelegramChannel {
    async fn send(&self, msg: OutgoingMessage) -> Result<()> {
        let chat_id = ChatId(msg.recipient);
        let chunks = split_chunks(&msg.text, TELEGRAM_MAX_MESSAGE_LEN);

        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut req = self.bot.send_message(chat_id, chunk);
            // Only the first chunk is threaded under the original message
            if i == 0
                && let Some(reply_to) = msg.reply_to
            {
                req = req.reply_parameters(
                    ReplyParameters::new(MessageId(reply_to)).allow_sending_without_reply(),
                );
            }
            req.await
                .with_context(|| format!("Telegram sendMessage to {} failed", msg.recipient))?;
        }

        debug!("Sent message to {}", msg.recipient);
        Ok(())
    }
}

/// Decode a webhook body into an inbound control message.
///
/// Returns `Ok(None)` for updates that carry no message (edits, callbacks, ...).
pub fn parse_update(body: &[u8]) -> Result<Option<IncomingMessage>> {
    let update: Update = serde_json::from_slice(body).context("Invalid Telegram update")?;

    let UpdateKind::Message(message) = update.kind else {
        debug!("Ignoring non-message update {}", update.id.0);
        return Ok(None);
    };

    Ok(Some(IncomingMessage {
        id: message.id.0,
        sender_id: message.chat.id.0,
        sender_name: message.chat.username().unwrap_or_default().to_string(),
        text: message.text().unwrap_or_default().to_string(),
        timestamp: message.date,
    }))
}

/// Split `text` into pieces of at most `max_units` UTF-16 code units, the unit
/// Telegram counts. Breaks at the last newline, else the last space, inside
/// each window; the separator itself is dropped.
fn split_chunks(text: &str, max_units: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let window_end = utf16_window(remaining, max_units);
        if window_end == remaining.len() {
            chunks.push(remaining.to_string());
            break;
        }

        let window = &remaining[..window_end];
        match window.rfind('\n').or_else(|| window.rfind(' ')) {
            Some(at) if at > 0 => {
                chunks.push(remaining[..at].to_string());
                remaining = &remaining[at + 1..];
            }
            _ => {
                chunks.push(window.to_string());
                remaining = &remaining[window_end..];
            }
        }
    }
    chunks
}

/// Byte length of the longest prefix of `text` within `max_units` UTF-16 units.
/// Always covers at least one char.
fn utf16_window(text: &str, max_units: usize) -> usize {
    let mut units = 0;
    for (i, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > max_units {
            return if i == 0 { ch.len_utf8() } else { i };
        }
    }
    text.len()
}
