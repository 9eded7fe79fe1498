//! Passwordless authentication primitives
//!
//! Pure functions only: token generation, hashing, signing and validation.
//! Persistence and HTTP wiring live in the service crate.

pub mod email;
pub mod magic_link;
pub mod session;

pub use email::normalize_email;
pub use magic_link::{
    check_magic_link, hash_token, magic_link_expiry, magic_link_url, MagicLinkError, MagicLinkToken,
};
pub use session::{decode_session, encode_session, SessionClaims, SessionError};
