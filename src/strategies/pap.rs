// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `pap`: username and password checked by the external credential verifier.

use std::sync::Arc;

use async_trait::async_trait;

use super::verifier::{CredentialVerifier, VerifierError};
use crate::decision::{AuthOutcome, AuthResult, Credentials, Strategy, StrategyError};

pub const NAME: &str = "pap";

pub struct PapStrategy {
    username: String,
    password: String,
    verifier: Arc<dyn CredentialVerifier>,
}

impl PapStrategy {
    pub fn new(credentials: Credentials, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            username: credentials.username.trim().to_string(),
            password: credentials.password,
            verifier,
        }
    }
}

#[async_trait]
impl Strategy for PapStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn authenticate(&self) -> Result<AuthOutcome, StrategyError> {
        if self.username.is_empty() {
            return Err(StrategyError::MissingField("username"));
        }
        if self.password.is_empty() {
            return Err(StrategyError::MissingField("password"));
        }

        let reply = self
            .verifier
            .verify(&self.username, &self.password)
            .await
            .map_err(|e| match e {
                VerifierError::Transient(msg) | VerifierError::Setup(msg) => {
                    StrategyError::Transient(msg)
                }
            })?;

        if !reply.accepted {
            return Ok(AuthOutcome::Rejected);
        }

        Ok(AuthOutcome::Accepted(AuthResult {
            username: self.username.clone(),
            method: NAME.to_string(),
            session_timeout: reply.session_timeout.filter(|t| *t > 0),
            reply_attrs: reply.reply_attributes,
        }))
    }
}
