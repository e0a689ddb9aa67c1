//! Bearer token issuing and verification.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("jwt token is invalid")]
    InvalidToken,

    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
}

/// Creates tokens for a subject id and verifies them back.
pub trait TokenIssuer: Send + Sync {
    fn create(&self, subject: u64) -> Result<String, TokenError>;

    fn verify(&self, token: &str) -> Result<u64, TokenError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: u64,
    exp: u64,
}

/// HMAC signed JWTs, base64 wrapped for transport.
#[derive(Clone)]
pub struct JwtIssuer {
    secret: Vec<u8>,
    algorithm: Algorithm,
    expires_after: Duration,
}

impl JwtIssuer {
    /// HS256 tokens valid for 72 hours.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            algorithm: Algorithm::HS256,
            expires_after: Duration::from_secs(72 * 60 * 60),
        }
    }

    /// Use another HMAC algorithm (HS384, HS512).
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn expires_after(mut self, expires_after: Duration) -> Self {
        self.expires_after = expires_after;
        self
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let jwt = encode(
            &Header::new(self.algorithm),
            claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(TokenError::Sign)?;
        Ok(STANDARD.encode(jwt))
    }
}

impl std::fmt::Debug for JwtIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIssuer")
            .field("algorithm", &self.algorithm)
            .field("expires_after", &self.expires_after)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer for JwtIssuer {
    fn create(&self, subject: u64) -> Result<String, TokenError> {
        let exp = SystemTime::now()
            .checked_add(self.expires_after)
            .unwrap_or(SystemTime::now())
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TokenError::InvalidToken)?
            .as_secs();
        self.sign(&Claims { id: subject, exp })
    }

    fn verify(&self, token: &str) -> Result<u64, TokenError> {
        let raw = STANDARD.decode(token).map_err(|_| TokenError::InvalidToken)?;
        let jwt = String::from_utf8(raw).map_err(|_| TokenError::InvalidToken)?;

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        let data = decode::<Claims>(&jwt, &DecodingKey::from_secret(&self.secret), &validation)
            .map_err(|err| {
                tracing::debug!(error = %err, "Token rejected");
                TokenError::InvalidToken
            })?;
        Ok(data.claims.id)
    }
}
