// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Policy resolution through the override chain.
//!
//! Resolution order, first hit wins:
//!
//! 1. Live per-user override in the backend (`policy:user:<username>`)
//! 2. Protocol hint: the `Filter-Id` reply attribute names a static policy
//! 3. The static policy named `default`
//!
//! There is no hardcoded fallback; an unresolvable identity is
//! [`DecisionError::NoPolicyFound`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::DecisionError;
use crate::store::{bounded, KvBackend, Keyspace, DEFAULT_OP_TIMEOUT};

/// Reply attribute carrying the policy hint.
pub const FILTER_ID_ATTR: &str = "Filter-Id";

/// Name of the static fallback policy.
pub const DEFAULT_POLICY: &str = "default";

/// Which authentication methods a user may use, and session limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Policy {
    pub name: String,
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub default_strategy: String,
    /// Seconds, 0 = unset.
    #[serde(default)]
    pub session_timeout: u64,
    #[serde(default)]
    pub idle_timeout: u64,
    #[serde(default)]
    pub redirect_url: String,
}

impl Policy {
    pub fn allows(&self, strategy: &str) -> bool {
        self.allowed.iter().any(|s| s == strategy)
    }
}

/// Layer that produced a resolved policy. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    Override,
    ProtocolHint,
    Default,
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PolicySource::Override => "override",
            PolicySource::ProtocolHint => "protocol_hint",
            PolicySource::Default => "default",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    pub policy: Policy,
    pub source: PolicySource,
}

/// Static policies by name, swappable as a whole.
///
/// Readers clone the inner `Arc` and never observe a half-applied reload.
#[derive(Debug, Default)]
pub struct PolicyTable {
    inner: RwLock<Arc<HashMap<String, Policy>>>,
}

impl PolicyTable {
    pub fn new(policies: HashMap<String, Policy>) -> Self {
        Self {
            inner: RwLock::new(Arc::new(policies)),
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, Policy>> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Policy> {
        self.snapshot().get(name).cloned()
    }

    /// Atomically replace every policy.
    pub fn replace(&self, policies: HashMap<String, Policy>) {
        let next = Arc::new(policies);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of live per-user policy overrides.
///
/// Lookup failures (backend down, unparseable payload) are reported as
/// `None` so resolution falls through to the next layer.
#[async_trait]
pub trait PolicyOverride: Send + Sync {
    async fn lookup(&self, username: &str) -> Option<Policy>;
}

/// Overrides stored as JSON under `policy:user:<username>`.
pub struct KvPolicyOverride {
    backend: Arc<dyn KvBackend>,
    keys: Keyspace,
    op_timeout: Duration,
}

impl KvPolicyOverride {
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
}

#[async_trait]
impl PolicyOverride for KvPolicyOverride {
    async fn lookup(&self, username: &str) -> Option<Policy> {
        let key = self.keys.policy_override(username);
        let raw = match bounded(self.op_timeout, self.backend.get(&key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(username, error = %e, "policy override lookup failed");
                return None;
            }
        };
        match serde_json::from_str::<Policy>(&raw) {
            Ok(policy) => Some(policy),
            Err(e) => {
                tracing::warn!(username, error = %e, "policy override is not valid json");
                None
            }
        }
    }
}

/// Resolves a [`Policy`] for an identity.
#[derive(Clone)]
pub struct PolicyEngine {
    table: Arc<PolicyTable>,
    overrides: Option<Arc<dyn PolicyOverride>>,
}

impl PolicyEngine {
    pub fn new(table: Arc<PolicyTable>, overrides: Option<Arc<dyn PolicyOverride>>) -> Self {
        Self { table, overrides }
    }

    pub fn table(&self) -> &Arc<PolicyTable> {
        &self.table
    }

    /// Resolve with optional protocol reply attributes.
    pub async fn resolve(
        &self,
        username: &str,
        hints: &HashMap<String, String>,
    ) -> Result<ResolvedPolicy, DecisionError> {
        let username = username.trim();

        if let Some(overrides) = self.overrides.as_ref().filter(|_| !username.is_empty()) {
            if let Some(policy) = overrides.lookup(username).await {
                return Ok(self.resolved(username, policy, PolicySource::Override));
            }
        }

        if let Some(filter_id) = hints
            .get(FILTER_ID_ATTR)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        {
            if let Some(policy) = self.table.get(filter_id) {
                return Ok(self.resolved(username, policy, PolicySource::ProtocolHint));
            }
        }

        if let Some(policy) = self.table.get(DEFAULT_POLICY) {
            return Ok(self.resolved(username, policy, PolicySource::Default));
        }

        tracing::info!(username, "no policy resolved");
        Err(DecisionError::NoPolicyFound(username.to_string()))
    }

    fn resolved(&self, username: &str, policy: Policy, source: PolicySource) -> ResolvedPolicy {
        tracing::info!(username, source = %source, policy = %policy.name, "policy resolved");
        ResolvedPolicy { policy, source }
    }
}
