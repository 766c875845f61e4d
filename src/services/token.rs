//! Bearer tokens: `v1.<user_id>.<expires_unix>.<hmac>`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, Secret};

use crate::services::signature;

const TOKEN_VERSION: &str = "v1";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Secret<String>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: Secret<String>, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    pub fn issue(&self, user_id: i64, now: DateTime<Utc>) -> IssuedToken {
        let expires_at = now + self.ttl;
        let body = format!("{}.{}.{}", TOKEN_VERSION, user_id, expires_at.timestamp());
        let sig = signature::sign(&body, self.secret.expose_secret().as_bytes());

        IssuedToken {
            token: format!("{}.{}", body, sig),
            expires_at,
        }
    }

    /// Returns the user ID carried by a valid, unexpired token
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<i64, TokenError> {
        let (body, sig) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;

        let mut parts = body.split('.');
        let (Some(version), Some(user_id), Some(expires), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        if version != TOKEN_VERSION {
            return Err(TokenError::Malformed);
        }
        let user_id: i64 = user_id.parse().map_err(|_| TokenError::Malformed)?;
        let expires: i64 = expires.parse().map_err(|_| TokenError::Malformed)?;

        if !signature::verify(body, sig, self.secret.expose_secret().as_bytes()) {
            return Err(TokenError::BadSignature);
        }

        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or(TokenError::Malformed)?;
        if expires_at <= now {
            return Err(TokenError::Expired);
        }

        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &str) -> TokenSigner {
        TokenSigner::new(Secret::new(secret.to_string()), Duration::hours(12))
    }

    #[test]
    fn test_issue_and_verify() {
        let now = Utc::now();
        let issued = signer("s3cret").issue(42, now);
        assert!(issued.token.starts_with("v1.42."));
        assert_eq!(signer("s3cret").verify(&issued.token, now), Ok(42));
    }

    #[test]
    fn test_rejects_other_secret() {
        let now = Utc::now();
        let issued = signer("s3cret").issue(42, now);
        assert_eq!(
            signer("different").verify(&issued.token, now),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_rejects_tampered_user() {
        let now = Utc::now();
        let issued = signer("s3cret").issue(42, now);
        let tampered = issued.token.replacen("v1.42.", "v1.1.", 1);
        assert_eq!(
            signer("s3cret").verify(&tampered, now),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_rejects_expired() {
        let now = Utc::now();
        let issued = signer("s3cret").issue(42, now);
        assert_eq!(
            signer("s3cret").verify(&issued.token, now + Duration::hours(13)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_rejects_garbage() {
        let now = Utc::now();
        for token in ["", "abc", "v1.x.1.ff", "v2.1.1.ff", "v1.1.2.3.ff"] {
            assert_eq!(signer("s3cret").verify(token, now), Err(TokenError::Malformed));
        }
    }
}
