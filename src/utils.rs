use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::HeaderMap;
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use crate::errors::AppError;

const MIN_PASSWORD_LENGTH: usize = 8;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|err| AppError::internal(format!("invalid password hash: {err}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Opaque per-device identifier scoping refresh tokens. Clients that send
/// `X-Device-Id` get a stable fingerprint across networks; otherwise we fall
/// back to a hash of user agent and client address.
pub fn device_fingerprint(headers: &HeaderMap) -> String {
    if let Some(device_id) = headers.get("x-device-id").and_then(|v| v.to_str().ok()) {
        let trimmed = device_id.trim();
        if !trimmed.is_empty() {
            return hash_fingerprint_input(trimmed);
        }
    }

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let addr = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim())
        .unwrap_or("unknown");

    hash_fingerprint_input(&format!("{user_agent}|{addr}"))
}

fn hash_fingerprint_input(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn short_password_is_rejected() {
        assert!(hash_password("short").is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("password123").unwrap();
        assert!(verify_password("password123", &hash).unwrap());
        assert!(!verify_password("wrongpassword", &hash).unwrap());
    }

    #[test]
    fn device_id_header_wins_over_user_agent() {
        let mut with_id = HeaderMap::new();
        with_id.insert("x-device-id", HeaderValue::from_static("laptop-1"));
        with_id.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static("curl/8.0"),
        );

        let mut without_id = HeaderMap::new();
        without_id.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static("curl/8.0"),
        );

        assert_ne!(device_fingerprint(&with_id), device_fingerprint(&without_id));
        // stable for the same device id
        assert_eq!(device_fingerprint(&with_id), device_fingerprint(&with_id));
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let headers = HeaderMap::new();
        let fpr = device_fingerprint(&headers);
        assert_eq!(fpr.len(), 64);
        assert!(fpr.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
