//! Magic link tokens
//!
//! A magic link carries a single-use, time-limited random token. The raw token
//! only ever travels in the email; the database keeps its SHA-256 digest, so a
//! leaked table cannot be replayed.

use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes per token (rendered as 64 hex characters)
pub const TOKEN_BYTES: usize = 32;

/// Freshly generated token and the digest to persist
#[derive(Debug, Clone)]
pub struct MagicLinkToken {
    /// Raw token, sent to the member and never stored
    pub token: String,
    /// SHA-256 hex digest stored in `magic_link_tokens.token_hash`
    pub token_hash: String,
}

impl MagicLinkToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let token_hash = hash_token(&token);
        Self { token, token_hash }
    }

    /// True for strings that could have come from `generate`
    pub fn is_well_formed(token: &str) -> bool {
        token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

/// SHA-256 hex digest of a raw token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().to_ascii_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Link emailed to the member
pub fn magic_link_url(public_url: &str, token: &str) -> String {
    format!("{}/auth/verify?token={}", public_url.trim_end_matches('/'), token)
}

/// Expiry instant for a token issued at `issued_at`
pub fn magic_link_expiry(issued_at: DateTime<Utc>, ttl_minutes: i64) -> DateTime<Utc> {
    crate::time::minutes_after(issued_at, ttl_minutes)
}

/// Why a stored token cannot be exchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicLinkError {
    AlreadyUsed,
    Expired,
}

impl std::fmt::Display for MagicLinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MagicLinkError::AlreadyUsed => write!(f, "Magic link has already been used"),
            MagicLinkError::Expired => write!(f, "Magic link has expired"),
        }
    }
}

impl std::error::Error for MagicLinkError {}

/// Validate a stored token's state at `now`
///
/// Use is checked before expiry so a replayed link reports "already used".
/// The expiry instant itself is already expired.
pub fn check_magic_link(
    used_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), MagicLinkError> {
    if used_at.is_some() {
        return Err(MagicLinkError::AlreadyUsed);
    }
    if now >= expires_at {
        return Err(MagicLinkError::Expired);
    }
    Ok(())
}
