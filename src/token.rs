//! Signed access and refresh tokens.
//!
//! Both token kinds share one claims shape and differ only in their `type`
//! discriminator and lifetime. Verification is stateless: a token is valid
//! when its signature checks out, it has not expired, and its type matches
//! what the caller asked for.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;
pub const REFRESH_TOKEN_EXPIRE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn lifetime(self) -> Duration {
        match self {
            TokenKind::Access => Duration::minutes(ACCESS_TOKEN_EXPIRE_MINUTES),
            TokenKind::Refresh => Duration::days(REFRESH_TOKEN_EXPIRE_DAYS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("invalid token type")]
    InvalidType,
    #[error("invalid token")]
    Malformed,
    #[error("could not sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

pub struct TokenService {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    /// Only the HMAC family is accepted since the key is a shared secret.
    pub fn new(secret: &[u8], algorithm: Algorithm) -> anyhow::Result<Self> {
        if secret.is_empty() {
            anyhow::bail!("secret key must be non-empty");
        }
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            anyhow::bail!("unsupported token algorithm {:?}, expected HS256/HS384/HS512", algorithm);
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        })
    }

    pub fn issue_access(&self, email: &str) -> Result<String, TokenError> {
        self.issue_at(TokenKind::Access, email, Utc::now())
    }

    pub fn issue_refresh(&self, email: &str) -> Result<String, TokenError> {
        self.issue_at(TokenKind::Refresh, email, Utc::now())
    }

    /// Returns `(access, refresh)`.
    pub fn issue_pair(&self, email: &str) -> Result<(String, String), TokenError> {
        let now = Utc::now();
        Ok((
            self.issue_at(TokenKind::Access, email, now)?,
            self.issue_at(TokenKind::Refresh, email, now)?,
        ))
    }

    pub(crate) fn issue_at(
        &self,
        kind: TokenKind,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: email.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + kind.lifetime()).timestamp(),
            kind,
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    /// Signature and expiry are checked before the type discriminator, so an
    /// expired token reports `Expired` whatever its type.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(
            |err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            },
        )?;

        if data.claims.kind != expected {
            return Err(TokenError::InvalidType);
        }
        Ok(data.claims)
    }
}
