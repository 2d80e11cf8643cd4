// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-strategy admission switches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::store::{bounded, KvBackend, Keyspace, DEFAULT_OP_TIMEOUT};

/// Decides whether a strategy is open to a user.
#[async_trait]
pub trait FeatureGate: Send + Sync {
    async fn enabled(&self, strategy: &str, user: &str) -> bool;
}

/// Every strategy is open to everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllGate;

#[async_trait]
impl FeatureGate for AllowAllGate {
    async fn enabled(&self, _strategy: &str, _user: &str) -> bool {
        true
    }
}

/// Switches stored in the backend.
///
/// `feature:<strategy>` opens the strategy globally and wins over
/// `feature:<strategy>:user:<user>`. Unreadable switches count as off.
pub struct KvFeatureGate {
    backend: Arc<dyn KvBackend>,
    keys: Keyspace,
    op_timeout: Duration,
}

impl KvFeatureGate {
    pub fn new(backend: Arc<dyn KvBackend>, keys: Keyspace) -> Self {
        Self {
            backend,
            keys,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    async fn flag(&self, key: &str) -> bool {
        match bounded(self.op_timeout, self.backend.get(key)).await {
            Ok(value) => value.as_deref().is_some_and(parse_flag),
            Err(e) => {
                tracing::warn!(key, error = %e, "feature flag lookup failed");
                false
            }
        }
    }
}

#[async_trait]
impl FeatureGate for KvFeatureGate {
    async fn enabled(&self, strategy: &str, user: &str) -> bool {
        if self.flag(&self.keys.feature(strategy)).await {
            return true;
        }
        if user.is_empty() {
            return false;
        }
        self.flag(&self.keys.feature_user(strategy, user)).await
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim(),
        "1" | "t" | "T" | "true" | "TRUE" | "True" | "on" | "yes"
    )
}
