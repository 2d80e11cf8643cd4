// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLogger;
use crate::config::{ControllerConfig, FeatureGateMode, Settings};
use crate::decision::{
    AllowAllGate, FeatureGate, KvFeatureGate, KvPolicyOverride, PolicyEngine, PolicyOverride,
    PolicyTable, RuleSet, StrategySelector,
};
use crate::store::{KvBackend, Keyspace, SessionStore};
use crate::strategies::{builtin_registry, CredentialVerifier, StrategyDeps};
use crate::trust::{KeySet, TokenIssuer, TrustProtocol};

/// Everything a request handler needs, built once by the composition root.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ControllerConfig>,
    pub rules: Arc<RuleSet>,
    pub policies: PolicyEngine,
    pub selector: StrategySelector,
    pub sessions: SessionStore,
    pub trust: TrustProtocol,
    pub tokens: Arc<TokenIssuer>,
    pub audit: AuditLogger,
    pub backend: Arc<dyn KvBackend>,
    /// Deadline for one backend round-trip.
    pub op_timeout: Duration,
    pub default_redirect_url: Option<String>,
    /// Test-harness bypass of request signing. Only honoured in `dev` builds.
    pub skip_trust_verification: bool,
}

impl AppState {
    pub fn new(
        settings: &Settings,
        config: ControllerConfig,
        keys: KeySet,
        backend: Arc<dyn KvBackend>,
        verifier: Option<Arc<dyn CredentialVerifier>>,
    ) -> Self {
        let keyspace = Keyspace::new(settings.kv_prefix.clone());
        let op_timeout = settings.backend_timeout;

        let mut tokens = TokenIssuer::new(settings.token_secret.as_bytes()).with_ttl(settings.token_ttl);
        if let Some(issuer) = &settings.token_issuer {
            tokens = tokens.with_issuer(issuer.clone());
        }
        let tokens = Arc::new(tokens);

        let table = Arc::new(PolicyTable::new(config.policy_map()));
        let overrides: Arc<dyn PolicyOverride> = Arc::new(
            KvPolicyOverride::new(Arc::clone(&backend), keyspace.clone()).with_op_timeout(op_timeout),
        );
        let gate: Arc<dyn FeatureGate> = match settings.feature_gates {
            FeatureGateMode::AllowAll => Arc::new(AllowAllGate),
            FeatureGateMode::Backend => Arc::new(
                KvFeatureGate::new(Arc::clone(&backend), keyspace.clone()).with_op_timeout(op_timeout),
            ),
        };

        let registry = builtin_registry(StrategyDeps {
            verifier,
            tokens: Arc::clone(&tokens),
            backend: Arc::clone(&backend),
            keys: keyspace.clone(),
            op_timeout,
        });
        tracing::info!(strategies = ?registry.names(), "strategy registry ready");

        let skip_trust_verification = cfg!(feature = "dev") && settings.skip_trust_verification;
        if settings.skip_trust_verification && !skip_trust_verification {
            tracing::warn!("trust verification bypass requested outside a dev build; ignoring");
        }
        if skip_trust_verification {
            tracing::warn!("trust verification is DISABLED");
        }

        let audit = settings
            .audit_secret
            .as_deref()
            .map(|secret| AuditLogger::new(secret.as_bytes().to_vec()))
            .unwrap_or_else(AuditLogger::disabled);

        Self {
            rules: Arc::new(RuleSet::compile(&config.role_rules)),
            policies: PolicyEngine::new(table, Some(overrides)),
            selector: StrategySelector::new(gate, Arc::new(registry)),
            sessions: SessionStore::new(Arc::clone(&backend), keyspace.clone())
                .with_op_timeout(op_timeout),
            trust: TrustProtocol::new(Arc::new(keys), Arc::clone(&backend), keyspace)
                .with_op_timeout(op_timeout),
            tokens,
            audit,
            backend,
            op_timeout,
            default_redirect_url: settings.default_redirect_url.clone(),
            skip_trust_verification,
            config: Arc::new(config),
        }
    }

    /// Policy version stamped on new sessions.
    pub fn policy_version(&self) -> &str {
        &self.config.controller.version
    }
}
