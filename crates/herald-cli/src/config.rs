use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub webhook_base_url: String,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default)]
    pub api_url: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &mask_secret(&self.bot_token))
            .field("webhook_base_url", &self.webhook_base_url)
            .field("webhook_path", &mask_secret(&self.webhook_path))
            .field("webhook_secret", &mask_secret(&self.webhook_secret))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            webhook_base_url: String::new(),
            webhook_path: default_webhook_path(),
            webhook_secret: String::new(),
            api_url: String::new(),
        }
    }
}

fn default_webhook_path() -> String {
    "telegram/webhook".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The only chat id allowed to create channels; 0 disables creation
    #[serde(default)]
    pub chat_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    9000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.herald/herald.db".to_string()
}

/// Render a secret for `herald config` and logs: first 3 and last 4 chars,
/// or `***` when that would reveal most of it
pub fn mask_secret(secret: &str) -> String {
    const HEAD: usize = 3;
    const TAIL: usize = 4;

    match secret.chars().count() {
        0 => "(empty)".to_string(),
        n if n <= HEAD + TAIL => "***".to_string(),
        n => {
            let head: String = secret.chars().take(HEAD).collect();
            let tail: String = secret.chars().skip(n - TAIL).collect();
            format!("{head}...{tail}")
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".herald")
}

impl HeraldConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // Refuse to start if group or other can read the file
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `herald init` first.",
                path.display()
            )
        })?;

        Self::parse(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Expand allowlisted env vars in `content` and parse it
    pub fn parse(content: &str) -> Result<Self> {
        if let Some(key) = hardcoded_secret(content) {
            warn!(
                "{} is hardcoded in config file. For security, use environment variables: {} = \"${{TELEGRAM_TOKEN}}\"",
                key, key
            );
        }

        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Checks needed before the relay can run
    pub fn validate_for_start(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            bail!("telegram.bot_token is empty (set TELEGRAM_TOKEN)");
        }
        if self.telegram.webhook_base_url.is_empty() {
            bail!("telegram.webhook_base_url is empty (set HERALD_DOMAIN)");
        }
        if self.admin.chat_id == 0 {
            warn!("admin.chat_id is not set; nobody can create channels");
        }
        Ok(())
    }

    /// Full public URL of the webhook endpoint
    pub fn webhook_url(&self) -> String {
        format!(
            "{}/{}",
            self.telegram.webhook_base_url.trim_end_matches('/'),
            self.telegram.webhook_path.trim_matches('/')
        )
    }

    pub fn webhook_secret(&self) -> Option<String> {
        Some(self.telegram.webhook_secret.clone()).filter(|s| !s.is_empty())
    }

    pub fn api_url(&self) -> Option<&str> {
        Some(self.telegram.api_url.as_str()).filter(|s| !s.is_empty())
    }
}

/// Environment variables that may be expanded in config files
const ALLOWED_ENV_VARS: &[&str] = &[
    "TELEGRAM_TOKEN",
    "HERALD_DOMAIN",
    "HERALD_BOT_URI",
    "HERALD_WEBHOOK_SECRET",
    "HOME",
    "USER",
];

/// Replace `${NAME}` with the value of `NAME` when it is allowlisted. Unset
/// variables expand to an empty string; anything else is left as written.
fn expand_env_vars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some((before, after)) = rest.split_once("${") {
        out.push_str(before);
        let Some((name, tail)) = after.split_once('}') else {
            out.push_str("${");
            rest = after;
            break;
        };

        if ALLOWED_ENV_VARS.contains(&name) {
            out.push_str(&std::env::var(name).unwrap_or_default());
        } else {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                name
            );
            out.push_str("${");
            out.push_str(name);
            out.push('}');
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}

/// Name of the first secret key whose raw value is a literal, not an env reference
fn hardcoded_secret(raw: &str) -> Option<&'static str> {
    for key in ["bot_token", "webhook_secret"] {
        for line in raw.lines() {
            let Some(rest) = line.trim().strip_prefix(key) else {
                continue;
            };
            let Some(value) = rest.trim_start().strip_prefix('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && !value.contains("${") {
                return Some(key);
            }
        }
    }
    None
}
