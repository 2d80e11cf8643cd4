// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `sms`: one-time code previously stored at `sms:code:<phone>`.
//!
//! Delivery of the code is outside the controller; whoever sends it writes
//! the key with a short TTL. A code is accepted at most once: the key must
//! still be deletable after the comparison.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::decision::{AuthOutcome, AuthResult, Credentials, Strategy, StrategyError};
use crate::store::{bounded, KvBackend, Keyspace, DEFAULT_OP_TIMEOUT};

pub const NAME: &str = "sms";

pub struct SmsStrategy {
    phone: String,
    code: String,
    backend: Arc<dyn KvBackend>,
    keys: Keyspace,
    op_timeout: Duration,
}

impl SmsStrategy {
    pub fn new(credentials: Credentials, backend: Arc<dyn KvBackend>, keys: Keyspace) -> Self {
        Self {
            phone: credentials.phone.trim().to_string(),
            code: credentials.code.trim().to_string(),
            backend,
            keys,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }
}

#[async_trait]
impl Strategy for SmsStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn authenticate(&self) -> Result<AuthOutcome, StrategyError> {
        if self.phone.is_empty() {
            return Err(StrategyError::MissingField("phone"));
        }
        if self.code.is_empty() {
            return Err(StrategyError::MissingField("code"));
        }

        let key = self.keys.sms_code(&self.phone);
        let stored = bounded(self.op_timeout, self.backend.get(&key))
            .await
            .map_err(|e| StrategyError::Transient(e.to_string()))?;

        if stored.as_deref().map(str::trim) != Some(self.code.as_str()) {
            return Ok(AuthOutcome::Rejected);
        }

        // Whoever removes the key owns the code.
        let removed = bounded(self.op_timeout, self.backend.delete(&[key]))
            .await
            .map_err(|e| StrategyError::Transient(e.to_string()))?;
        if removed == 0 {
            return Ok(AuthOutcome::Rejected);
        }

        Ok(AuthOutcome::Accepted(AuthResult {
            username: self.phone.clone(),
            method: NAME.to_string(),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use crate::testing::FailingBackend;

    fn creds(phone: &str, code: &str) -> Credentials {
        Credentials {
            phone: phone.to_string(),
            code: code.to_string(),
            ..Default::default()
        }
    }

    async fn backend_with_code(phone: &str, code: &str) -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .set(&Keyspace::new("t:").sms_code(phone), code, Duration::from_secs(300))
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn code_is_accepted_exactly_once() {
        let backend = backend_with_code("+15550100", "123456").await;
        let strategy = SmsStrategy::new(creds("+15550100", "123456"), backend, Keyspace::new("t:"));

        assert!(matches!(
            strategy.authenticate().await,
            Ok(AuthOutcome::Accepted(ref r)) if r.username == "+15550100"
        ));
        assert_eq!(strategy.authenticate().await, Ok(AuthOutcome::Rejected));
    }

    #[tokio::test]
    async fn wrong_code_is_rejected_and_kept() {
        let backend = backend_with_code("+15550100", "123456").await;
        let keys = Keyspace::new("t:");
        let strategy = SmsStrategy::new(creds("+15550100", "000000"), backend.clone(), keys.clone());
        assert_eq!(strategy.authenticate().await, Ok(AuthOutcome::Rejected));
        assert!(backend.exists(&keys.sms_code("+15550100")).await.unwrap());
    }

    #[tokio::test]
    async fn backend_failure_is_transient() {
        let strategy = SmsStrategy::new(
            creds("+15550100", "1"),
            Arc::new(FailingBackend),
            Keyspace::new("t:"),
        );
        assert!(matches!(
            strategy.authenticate().await,
            Err(StrategyError::Transient(_))
        ));
    }
}
