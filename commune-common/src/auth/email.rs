//! Email address normalization

use crate::{Error, Result};

const MAX_EMAIL_LEN: usize = 254;

/// Trim and lowercase an email address, rejecting obviously invalid ones
///
/// Accepts `local@domain.tld` shapes only; deliverability is the mail
/// service's problem.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();

    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(Error::InvalidInput(format!("Invalid email address: {}", raw.trim())));
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidInput(format!("Invalid email address: {}", raw.trim())));
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| Error::InvalidInput(format!("Invalid email address: {}", raw.trim())))?;

    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");

    if local.is_empty() || !domain_ok {
        return Err(Error::InvalidInput(format!("Invalid email address: {}", raw.trim())));
    }

    Ok(email)
}
