//! The channel entity, name validation and token generation

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of a generated channel token
pub const TOKEN_LEN: usize = 12;

const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A named, token-protected broadcast group
///
/// `owner` is always a recipient of broadcasts but never appears in `users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub token: String,
    pub owner: i64,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub users: Vec<i64>,
}

impl Channel {
    /// Create a channel owned by `owner` with a freshly generated token and no followers
    pub fn new(id: impl Into<String>, owner: i64, owner_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: generate_token(),
            owner,
            owner_name: owner_name.into(),
            users: Vec::new(),
        }
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner == user_id
    }

    pub fn is_following(&self, user_id: i64) -> bool {
        self.users.contains(&user_id)
    }
}

/// Check a channel name against `^[A-Za-z0-9_]{2,}$`
pub fn check_name(name: &str) -> bool {
    name.len() >= 2
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Generate a channel token: 12 characters drawn uniformly from `[a-zA-Z]`
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}
