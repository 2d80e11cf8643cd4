// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Short-lived bearer tokens for admitted identities.
//!
//! Tokens are HS256 JWTs carrying `sub`, `iat`, `exp` and `iss`. They are
//! handed to the client after admission and checked again by the gateway
//! auth-subrequest endpoint and the `token` strategy.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Default bearer-token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Default `iss` claim.
pub const DEFAULT_ISSUER: &str = "ap-controller";

/// Bearer token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub ttl_secs: u64,
}

/// Error type for token issuance and verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token issuer is invalid")]
    InvalidIssuer,
    #[error("token is malformed")]
    Malformed,
}

/// Stateless HS256 signer bound to a server-held secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: DEFAULT_TOKEN_TTL,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `subject`.
    pub fn issue(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, Utc::now().timestamp())
    }

    /// [`issue`](Self::issue) with an explicit issue time.
    pub fn issue_at(&self, subject: &str, now: i64) -> Result<IssuedToken, TokenError> {
        let ttl_secs = self.ttl.as_secs();
        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: now,
            exp: now + ttl_secs as i64,
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, ttl_secs })
    }

    /// Check signature, issuer and expiry.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
                _ => TokenError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let issuer = TokenIssuer::new(b"token-secret");
        let issued = issuer.issue("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(issued.ttl_secs, 900);

        let claims = issuer.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "aa:bb:cc:dd:ee:ff");
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn other_secret_is_rejected() {
        let issued = TokenIssuer::new(b"one").issue("bob").unwrap();
        assert_eq!(
            TokenIssuer::new(b"two").verify(&issued.token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = TokenIssuer::new(b"token-secret").with_ttl(Duration::from_secs(60));
        let issued = issuer
            .issue_at("bob", Utc::now().timestamp() - 3600)
            .unwrap();
        assert_eq!(issuer.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let issued = TokenIssuer::new(b"s").with_issuer("someone-else").issue("bob").unwrap();
        assert_eq!(
            TokenIssuer::new(b"s").verify(&issued.token),
            Err(TokenError::InvalidIssuer)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            TokenIssuer::new(b"s").verify("not.a.jwt"),
            Err(TokenError::Malformed)
        );
    }
}
