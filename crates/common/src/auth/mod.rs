//! Authentication utilities
//!
//! Shared-secret checks for the digest triggers:
//! - Bearer secret sent by the scheduler
//! - Admin key passed as a query parameter for manual runs

use crate::errors::{AppError, Result};
use sha2::{Digest, Sha256};

/// Hash a secret for comparison
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two secrets by digest
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let a = hash_secret(provided);
    let b = hash_secret(expected);
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extract the token from a `Bearer <token>` header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn configured(secret: Option<&str>) -> Option<&str> {
    secret.filter(|s| !s.trim().is_empty())
}

/// Scheduler check. No configured secret lets every caller through.
pub fn verify_bearer(auth_header: Option<&str>, secret: Option<&str>) -> Result<()> {
    let Some(secret) = configured(secret) else {
        return Ok(());
    };

    match auth_header.and_then(extract_bearer) {
        Some(token) if secrets_match(token, secret) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// Manual trigger check. The key must be configured and match.
pub fn verify_admin_key(provided: Option<&str>, secret: Option<&str>) -> Result<()> {
    match (provided, configured(secret)) {
        (Some(key), Some(secret)) if secrets_match(key, secret) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}
