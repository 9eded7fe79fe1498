//! Signed session tokens
//!
//! Format: `v1.<base64url(json claims)>.<base64url(hmac-sha256)>`.
//! The signature covers the encoded payload part. Verification uses the
//! constant-time `verify_slice`.
//!
//! A valid signature is necessary but not sufficient: the service also checks
//! that the `sid` session row exists and has not been revoked.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const SESSION_VERSION_V1: &str = "v1";
const MAX_TOKEN_LEN: usize = 1024;

/// Claims carried by a session token (times are Unix seconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session row id
    pub sid: Uuid,
    /// Member id
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(sid: Uuid, sub: Uuid, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sid,
            sub,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    Malformed,
    UnsupportedVersion,
    BadSignature,
    Expired,
    /// Claims could not be serialized or the key was rejected
    Signing,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Malformed => write!(f, "Malformed session token"),
            SessionError::UnsupportedVersion => write!(f, "Unsupported session token version"),
            SessionError::BadSignature => write!(f, "Session token signature mismatch"),
            SessionError::Expired => write!(f, "Session has expired"),
            SessionError::Signing => write!(f, "Failed to sign session token"),
        }
    }
}

impl std::error::Error for SessionError {}

fn mac_for(secret: &[u8]) -> Result<HmacSha256, SessionError> {
    <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| SessionError::Signing)
}

/// Sign claims into a session token
pub fn encode_session(claims: &SessionClaims, secret: &[u8]) -> Result<String, SessionError> {
    let payload = serde_json::to_vec(claims).map_err(|_| SessionError::Signing)?;
    let payload_part = URL_SAFE_NO_PAD.encode(payload);

    let mut mac = mac_for(secret)?;
    mac.update(payload_part.as_bytes());
    let sig_part = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}.{}", SESSION_VERSION_V1, payload_part, sig_part))
}

/// Verify a session token and return its claims
///
/// Checks, in order: length, shape, version, signature, payload, expiry.
pub fn decode_session(
    token: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<SessionClaims, SessionError> {
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(SessionError::Malformed);
    }

    let parts: Vec<&str> = token.split('.').collect();
    let (payload_part, sig_part) = match parts.as_slice() {
        [version, payload, sig] if *version == SESSION_VERSION_V1 => (*payload, *sig),
        [_, _, _] => return Err(SessionError::UnsupportedVersion),
        _ => return Err(SessionError::Malformed),
    };

    let signature = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|_| SessionError::Malformed)?;
    let mut mac = mac_for(secret)?;
    mac.update(payload_part.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| SessionError::BadSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_part)
        .map_err(|_| SessionError::Malformed)?;
    let claims: SessionClaims =
        serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)?;

    if now.timestamp() >= claims.exp {
        return Err(SessionError::Expired);
    }

    Ok(claims)
}
