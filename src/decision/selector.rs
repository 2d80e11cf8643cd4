// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Strategy selection: requested or default strategy, then the feature gate,
//! then the policy allow-list, then construction.

use std::sync::Arc;

use super::error::DecisionError;
use super::feature::FeatureGate;
use super::policy::Policy;
use super::strategy::{Credentials, Strategy, StrategyRegistry};

#[derive(Clone)]
pub struct StrategySelector {
    gate: Arc<dyn FeatureGate>,
    registry: Arc<StrategyRegistry>,
}

impl StrategySelector {
    pub fn new(gate: Arc<dyn FeatureGate>, registry: Arc<StrategyRegistry>) -> Self {
        Self { gate, registry }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Name of the strategy to run, before any gate is checked.
    pub fn choose(policy: &Policy, requested: Option<&str>) -> Result<String, DecisionError> {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());
        let chosen = match requested {
            Some(name) => name,
            None if !policy.default_strategy.trim().is_empty() => policy.default_strategy.trim(),
            None => policy
                .allowed
                .first()
                .map(String::as_str)
                .unwrap_or_default(),
        };
        if chosen.is_empty() {
            return Err(DecisionError::NoStrategySelected);
        }
        Ok(chosen.to_string())
    }

    /// Pick, gate and build the strategy for `policy`.
    ///
    /// The gate is evaluated for [`Credentials::subject`], so per-user sms
    /// switches are keyed by phone number.
    pub async fn select_and_build(
        &self,
        policy: &Policy,
        requested: Option<&str>,
        credentials: Credentials,
    ) -> Result<Box<dyn Strategy>, DecisionError> {
        let chosen = Self::choose(policy, requested)?;

        if !self.gate.enabled(&chosen, credentials.subject()).await {
            return Err(DecisionError::FeatureDisabled(chosen));
        }
        if !policy.allows(&chosen) {
            return Err(DecisionError::StrategyNotAllowed(chosen));
        }

        tracing::debug!(strategy = %chosen, policy = %policy.name, "strategy selected");
        self.registry.build(&chosen, credentials)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use std::time::Duration;

    use crate::decision::feature::{AllowAllGate, KvFeatureGate};
    use crate::decision::strategy::{AuthOutcome, StrategyError};
    use crate::store::{KvBackend, Keyspace, MemoryBackend};

    struct Fixed(&'static str);

    #[async_trait]
    impl Strategy for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn authenticate(&self) -> Result<AuthOutcome, StrategyError> {
            Ok(AuthOutcome::Rejected)
        }
    }

    struct DenyGate;

    #[async_trait]
    impl FeatureGate for DenyGate {
        async fn enabled(&self, _strategy: &str, _user: &str) -> bool {
            false
        }
    }

    fn registry() -> Arc<StrategyRegistry> {
        let mut registry = StrategyRegistry::new();
        registry.register("pap", |_| Box::new(Fixed("pap")) as Box<dyn Strategy>);
        Arc::new(registry)
    }

    fn policy(allowed: &[&str], default_strategy: &str) -> Policy {
        Policy {
            name: "p".to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            default_strategy: default_strategy.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn choose_prefers_request_then_default_then_first_allowed() {
        let p = policy(&["sms", "pap"], "pap");
        assert_eq!(StrategySelector::choose(&p, Some("token")).unwrap(), "token");
        assert_eq!(StrategySelector::choose(&p, Some("  ")).unwrap(), "pap");
        assert_eq!(StrategySelector::choose(&policy(&["sms"], ""), None).unwrap(), "sms");
        assert_eq!(
            StrategySelector::choose(&policy(&[], ""), None),
            Err(DecisionError::NoStrategySelected)
        );
    }

    #[tokio::test]
    async fn builds_when_every_gate_passes() {
        let selector = StrategySelector::new(Arc::new(AllowAllGate), registry());
        let strategy = selector
            .select_and_build(&policy(&["pap"], "pap"), None, Credentials::default())
            .await
            .unwrap();
        assert_eq!(strategy.name(), "pap");
    }

    #[tokio::test]
    async fn feature_gate_is_checked_before_allow_list() {
        let selector = StrategySelector::new(Arc::new(DenyGate), registry());
        let err = selector
            .select_and_build(&policy(&[], ""), Some("sms"), Credentials::default())
            .await
            .err();
        assert_eq!(err, Some(DecisionError::FeatureDisabled("sms".to_string())));
    }

    #[tokio::test]
    async fn per_user_sms_switch_is_keyed_by_phone() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .set("t:feature:sms:user:+15550100", "1", Duration::from_secs(60))
            .await
            .unwrap();
        let gate = KvFeatureGate::new(backend, Keyspace::new("t:"));

        let mut registry = StrategyRegistry::new();
        registry.register("sms", |_| Box::new(Fixed("sms")) as Box<dyn Strategy>);
        let selector = StrategySelector::new(Arc::new(gate), Arc::new(registry));
        let sms_policy = policy(&["sms"], "sms");

        let phone = |number: &str| Credentials {
            phone: number.to_string(),
            code: "123456".to_string(),
            ..Default::default()
        };
        let strategy = selector
            .select_and_build(&sms_policy, None, phone("+15550100"))
            .await
            .unwrap();
        assert_eq!(strategy.name(), "sms");

        let err = selector
            .select_and_build(&sms_policy, None, phone("+15550199"))
            .await
            .err();
        assert_eq!(err, Some(DecisionError::FeatureDisabled("sms".to_string())));
    }

    #[test]
    fn subject_prefers_username_over_phone() {
        let creds = Credentials {
            username: " bob ".to_string(),
            phone: "+15550100".to_string(),
            ..Default::default()
        };
        assert_eq!(creds.subject(), "bob");
        let creds = Credentials {
            phone: "+15550100".to_string(),
            ..Default::default()
        };
        assert_eq!(creds.subject(), "+15550100");
    }

    #[tokio::test]
    async fn disallowed_strategy_is_rejected() {
        let selector = StrategySelector::new(Arc::new(AllowAllGate), registry());
        let err = selector
            .select_and_build(&policy(&["pap"], "pap"), Some("sms"), Credentials::default())
            .await
            .err();
        assert_eq!(err, Some(DecisionError::StrategyNotAllowed("sms".to_string())));
    }

    #[tokio::test]
    async fn unregistered_strategy_is_unknown() {
        let selector = StrategySelector::new(Arc::new(AllowAllGate), registry());
        let err = selector
            .select_and_build(&policy(&["sms"], ""), None, Credentials::default())
            .await
            .err();
        assert_eq!(err, Some(DecisionError::UnknownStrategy("sms".to_string())));
    }
}
