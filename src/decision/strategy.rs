// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication strategies and the registry that builds them.
//!
//! The composition root registers every strategy it wants to offer; nothing
//! registers itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::DecisionError;

/// Credential fields from an authentication request. Unused fields are empty.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub token: String,
    pub phone: String,
    pub code: String,
}

impl Credentials {
    /// Who the request speaks for: the username, else the phone number.
    pub fn subject(&self) -> &str {
        match self.username.trim() {
            "" => self.phone.trim(),
            username => username,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &format_args!("[{} bytes]", self.password.len()))
            .field("token", &(!self.token.is_empty()))
            .field("phone", &self.phone)
            .field("code", &(!self.code.is_empty()))
            .finish()
    }
}

/// Details of an accepted authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResult {
    pub username: String,
    pub method: String,
    /// Session lifetime suggested by the authenticator, seconds.
    pub session_timeout: Option<u64>,
    /// Reply attributes, fed back into policy resolution.
    pub reply_attrs: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Accepted(AuthResult),
    Rejected,
}

/// Error type for strategy execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    /// A credential field the strategy needs was empty.
    #[error("missing {0}")]
    MissingField(&'static str),

    /// The authenticator could not reach its backing service.
    #[error("authentication service unavailable: {0}")]
    Transient(String),
}

/// One authentication method, bound to the request's credentials.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn authenticate(&self) -> Result<AuthOutcome, StrategyError>;
}

/// Builds a strategy instance from request credentials.
pub type StrategyBuilder = Arc<dyn Fn(Credentials) -> Box<dyn Strategy> + Send + Sync>;

/// Strategy builders keyed by name.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    builders: HashMap<String, StrategyBuilder>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(Credentials) -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Arc::new(builder));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(&self, name: &str, credentials: Credentials) -> Result<Box<dyn Strategy>, DecisionError> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| DecisionError::UnknownStrategy(name.to_string()))?;
        Ok(builder(credentials))
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
