//! Webhook authentication: Telegram secret-token header validation

use axum::http::HeaderMap;
use herald_core::auth::constant_time_eq;
use tracing::warn;

/// Header Telegram sets on every webhook call when a secret was registered
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Validate the webhook secret header against the configured secret.
///
/// Returns `true` if:
/// - No secret is configured (check disabled)
/// - The header matches the configured secret
pub fn check_webhook_secret(configured: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(configured) = configured.filter(|s| !s.is_empty()) else {
        return true;
    };

    match header_str(headers, SECRET_TOKEN_HEADER) {
        Some(provided) if constant_time_eq(configured.as_bytes(), provided.as_bytes()) => true,
        Some(_) => {
            warn!("Webhook auth: secret token mismatch");
            false
        }
        None => {
            warn!("Webhook auth: no secret token provided");
            false
        }
    }
}

/// Header value as trimmed text; `None` when absent, empty or not visible ASCII
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
