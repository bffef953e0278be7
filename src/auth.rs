//! Credential verification and access tokens
//!
//! Static credentials come from configuration and are held as Argon2 hashes.
//! Access tokens are stateless HS256 JWTs; nothing is stored server-side.

use std::collections::HashMap;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::AppError;

/// Hashed against when the username is unknown, so both failure paths cost the same.
const DUMMY_SECRET: &str = "fraud-scoring-unknown-user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("credentials missing from request")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // Username
    pub exp: i64,         // Expiration timestamp
    pub iat: i64,         // Issued at
    pub jti: String,      // Token id
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject(pub String);

/// Signed token handed out by `/login`
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn expires_in_secs(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }
}

/// Issues and verifies access tokens against static credentials
pub struct CredentialVerifier {
    credentials: HashMap<String, String>,
    dummy_hash: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_lifetime: Duration,
}

impl CredentialVerifier {
    /// Build from `(username, secret)` pairs. A secret that already parses as
    /// an Argon2 PHC string is kept; anything else is hashed with `params`.
    pub fn new(
        credentials: &[(String, String)],
        jwt_secret: &str,
        token_lifetime: Duration,
        params: Params,
    ) -> Result<Self, argon2::password_hash::Error> {
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut hashed = HashMap::with_capacity(credentials.len());
        for (username, secret) in credentials {
            let hash = if PasswordHash::new(secret).is_ok() {
                secret.clone()
            } else {
                hash_secret(&hasher, secret)?
            };
            hashed.insert(username.clone(), hash);
        }

        if hashed.is_empty() {
            tracing::warn!("No API credentials configured; every login will be rejected");
        }

        Ok(Self {
            credentials: hashed,
            dummy_hash: hash_secret(&hasher, DUMMY_SECRET)?,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_lifetime,
        })
    }

    /// Verify the password for `username` and sign a token.
    ///
    /// CPU-heavy (Argon2); call from a blocking context.
    pub fn issue_token(&self, username: &str, password: &str) -> Result<AccessToken, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let (stored, known) = match self.credentials.get(username) {
            Some(hash) => (hash.as_str(), true),
            None => (self.dummy_hash.as_str(), false),
        };

        let parsed_hash = PasswordHash::new(stored).map_err(|_| AuthError::InvalidCredentials)?;
        let verified = Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok();

        if !(verified && known) {
            return Err(AuthError::InvalidCredentials);
        }

        self.sign(username, Utc::now())
    }

    /// Check signature and expiry, returning the token's subject
    pub fn verify_token(&self, token: &str) -> Result<Subject, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })?;

        if token_data.claims.sub.is_empty() {
            return Err(AuthError::TokenInvalid);
        }

        Ok(Subject(token_data.claims.sub))
    }

    fn sign(&self, username: &str, now: DateTime<Utc>) -> Result<AccessToken, AuthError> {
        let exp = now + self.token_lifetime;

        let claims = Claims {
            sub: username.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to sign access token: {}", e);
            AuthError::TokenInvalid
        })?;

        Ok(AccessToken {
            token,
            subject: claims.sub,
            issued_at: Utc.timestamp_opt(claims.iat, 0).single().unwrap_or(now),
            expires_at: Utc.timestamp_opt(claims.exp, 0).single().unwrap_or(exp),
        })
    }
}

fn hash_secret(hasher: &Argon2<'_>, secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(hasher.hash_password(secret.as_bytes(), &salt)?.to_string())
}

// Implement FromRequestParts for Subject
#[axum::async_trait]
impl<S> FromRequestParts<S> for Subject
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions
            .get::<Subject>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> Params {
        Params::new(Params::MIN_M_COST, 1, 1, None).unwrap()
    }

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new(
            &[("admin".to_string(), "s3cret".to_string())],
            "test-secret",
            Duration::minutes(5),
            fast_params(),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_then_verify_returns_subject() {
        let verifier = verifier();
        let token = verifier.issue_token("admin", "s3cret").unwrap();

        assert_eq!(token.subject, "admin");
        assert_eq!(token.expires_in_secs(), 300);
        assert_eq!(verifier.verify_token(&token.token).unwrap(), Subject("admin".to_string()));
    }

    #[test]
    fn test_wrong_password_and_unknown_user_look_alike() {
        let verifier = verifier();
        assert_eq!(
            verifier.issue_token("admin", "wrong").unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            verifier.issue_token("nobody", "s3cret").unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[test]
    fn test_unknown_user_cannot_use_dummy_secret() {
        let verifier = verifier();
        assert_eq!(
            verifier.issue_token("nobody", DUMMY_SECRET).unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[test]
    fn test_missing_fields() {
        let verifier = verifier();
        assert_eq!(verifier.issue_token("", "s3cret").unwrap_err(), AuthError::MissingCredentials);
        assert_eq!(verifier.issue_token("admin", "").unwrap_err(), AuthError::MissingCredentials);
    }

    #[test]
    fn test_prehashed_secret_is_kept() {
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, fast_params());
        let phc = hash_secret(&hasher, "hunter2").unwrap();

        let verifier = CredentialVerifier::new(
            &[("ops".to_string(), phc)],
            "test-secret",
            Duration::minutes(5),
            fast_params(),
        )
        .unwrap();

        assert!(verifier.issue_token("ops", "hunter2").is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = verifier();
        let issued = Utc::now() - Duration::minutes(10);
        let token = verifier.sign("admin", issued).unwrap();

        assert_eq!(verifier.verify_token(&token.token).unwrap_err(), AuthError::TokenExpired);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let verifier = verifier();
        let token = verifier.issue_token("admin", "s3cret").unwrap().token;

        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let forged = Claims {
            sub: "root".to_string(),
            exp: Utc::now().timestamp() + 600,
            iat: Utc::now().timestamp(),
            jti: "x".to_string(),
        };
        parts[1] = {
            use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap())
        };
        let tampered = parts.join(".");

        assert_eq!(verifier.verify_token(&tampered).unwrap_err(), AuthError::TokenInvalid);
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let other = CredentialVerifier::new(
            &[("admin".to_string(), "s3cret".to_string())],
            "another-secret",
            Duration::minutes(5),
            fast_params(),
        )
        .unwrap();
        let token = other.issue_token("admin", "s3cret").unwrap();

        assert_eq!(verifier().verify_token(&token.token).unwrap_err(), AuthError::TokenInvalid);
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert_eq!(verifier().verify_token("not-a-jwt").unwrap_err(), AuthError::TokenInvalid);
    }
}
