//! Authenticity checks for queue message deliveries.
//!
//! The queue transport attaches a detached JWT to every delivery: an HS256
//! token whose `body` claim is the base64url-encoded SHA-256 of the raw
//! request body. Verifying the token against the per-deployment signing
//! secret proves both that the message came from the transport and that
//! the body was not altered in flight.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Header carrying the detached signature token.
pub const SIGNATURE_HEADER: &str = "X-Queue-Signature";

const SIGNATURE_TTL_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("body hash mismatch")]
    BodyMismatch,
}

#[derive(Debug, Serialize, Deserialize)]
struct SignatureClaims {
    iss: String,
    iat: i64,
    exp: i64,
    jti: String,
    /// base64url(SHA-256(raw body))
    body: String,
}

fn body_digest(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Produce a delivery signature for `body`. Used by the local enqueue CLI
/// and by tests; in production the queue transport itself signs deliveries
/// with the same shared secret.
pub fn sign(body: &str, signing_key: &str) -> Result<String, SignatureError> {
    let now = Utc::now();
    let claims = SignatureClaims {
        iss: "linkdock-queue".to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(SIGNATURE_TTL_SECS)).timestamp(),
        jti: Uuid::new_v4().to_string(),
        body: body_digest(body),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key.as_bytes()),
    )?;
    Ok(token)
}

/// Verify a delivery signature against the raw request body.
pub fn verify(token: &str, body: &str, signing_key: &str) -> Result<(), SignatureError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 30;

    let data = decode::<SignatureClaims>(
        token,
        &DecodingKey::from_secret(signing_key.as_bytes()),
        &validation,
    )?;

    if data.claims.body != body_digest(body) {
        return Err(SignatureError::BodyMismatch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test-signing-key";

    #[test]
    fn signed_body_verifies() {
        let body = r#"{"workspaceId":1}"#;
        let token = sign(body, KEY).unwrap();
        verify(&token, body, KEY).unwrap();
    }

    #[test]
    fn tampered_body_is_rejected() {
        let token = sign(r#"{"workspaceId":1}"#, KEY).unwrap();
        let err = verify(&token, r#"{"workspaceId":2}"#, KEY).unwrap_err();
        assert!(matches!(err, SignatureError::BodyMismatch));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let body = r#"{"workspaceId":1}"#;
        let token = sign(body, KEY).unwrap();
        assert!(verify(&token, body, "other-key").is_err());
    }
}
