// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `token`: a bearer token previously minted by this controller.

use std::sync::Arc;

use async_trait::async_trait;

use crate::decision::{AuthOutcome, AuthResult, Credentials, Strategy, StrategyError};
use crate::store::normalize_identity;
use crate::trust::TokenIssuer;

pub const NAME: &str = "token";

pub struct TokenStrategy {
    username: String,
    token: String,
    issuer: Arc<TokenIssuer>,
}

impl TokenStrategy {
    pub fn new(credentials: Credentials, issuer: Arc<TokenIssuer>) -> Self {
        Self {
            username: normalize_identity(&credentials.username),
            token: credentials.token.trim().to_string(),
            issuer,
        }
    }
}

#[async_trait]
impl Strategy for TokenStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn authenticate(&self) -> Result<AuthOutcome, StrategyError> {
        if self.username.is_empty() {
            return Err(StrategyError::MissingField("username"));
        }
        if self.token.is_empty() {
            return Err(StrategyError::MissingField("token"));
        }

        match self.issuer.verify(&self.token) {
            Ok(claims) if claims.sub == self.username => Ok(AuthOutcome::Accepted(AuthResult {
                username: self.username.clone(),
                method: NAME.to_string(),
                ..Default::default()
            })),
            Ok(_) => {
                tracing::debug!(username = %self.username, "token subject mismatch");
                Ok(AuthOutcome::Rejected)
            }
            Err(e) => {
                tracing::debug!(username = %self.username, error = %e, "token rejected");
                Ok(AuthOutcome::Rejected)
            }
        }
    }
}
