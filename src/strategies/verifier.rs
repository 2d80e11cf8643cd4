// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External credential verifier (the AAA side of `pap`).
//!
//! The controller only relies on the request/response contract:
//!
//! ```text
//! POST {url}  {"username": "...", "password": "..."}
//! 200         {"accepted": true, "reply_attributes": {"Filter-Id": "staff"}, "session_timeout": 3600}
//! 401 / 403   rejected
//! other       transient failure
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Default verifier timeout.
pub const DEFAULT_VERIFIER_TIMEOUT: Duration = Duration::from_secs(3);

/// Answer of the verifier for one credential pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VerifierReply {
    pub accepted: bool,
    #[serde(default)]
    pub reply_attributes: HashMap<String, String>,
    #[serde(default)]
    pub session_timeout: Option<u64>,
}

impl VerifierReply {
    pub fn rejected() -> Self {
        Self::default()
    }
}

/// Error type for verifier calls. Explicit rejection is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifierError {
    /// Network failure, timeout or unexpected status.
    #[error("credential verifier unavailable: {0}")]
    Transient(String),

    #[error("credential verifier client setup failed: {0}")]
    Setup(String),
}

/// Checks a username/password pair.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> Result<VerifierReply, VerifierError>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// JSON-over-HTTP verifier.
#[derive(Clone)]
pub struct HttpCredentialVerifier {
    http: Client,
    url: String,
}

impl HttpCredentialVerifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VerifierError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifierError::Setup(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn verify(&self, username: &str, password: &str) -> Result<VerifierReply, VerifierError> {
        let response = self
            .http
            .post(&self.url)
            .json(&VerifyRequest { username, password })
            .send()
            .await
            .map_err(|e| VerifierError::Transient(format!("verify request failed: {e}")))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(VerifierReply::rejected()),
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| VerifierError::Transient(format!("invalid verifier response: {e}"))),
            status => Err(VerifierError::Transient(format!(
                "verifier returned {status}"
            ))),
        }
    }
}
