// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Concrete authentication strategies.

pub mod pap;
pub mod sms;
pub mod token;
pub mod verifier;

use std::sync::Arc;
use std::time::Duration;

use crate::decision::{Strategy, StrategyRegistry};
use crate::store::{KvBackend, Keyspace};
use crate::trust::TokenIssuer;

pub use pap::PapStrategy;
pub use sms::SmsStrategy;
pub use token::TokenStrategy;
pub use verifier::{CredentialVerifier, HttpCredentialVerifier, VerifierError, VerifierReply};

/// Dependencies the built-in strategies need.
pub struct StrategyDeps {
    /// `pap` is only registered when a verifier is available.
    pub verifier: Option<Arc<dyn CredentialVerifier>>,
    pub tokens: Arc<TokenIssuer>,
    pub backend: Arc<dyn KvBackend>,
    pub keys: Keyspace,
    pub op_timeout: Duration,
}

/// Registry with every built-in strategy whose dependencies are present.
pub fn builtin_registry(deps: StrategyDeps) -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();

    if let Some(verifier) = deps.verifier {
        registry.register(pap::NAME, move |creds| {
            Box::new(PapStrategy::new(creds, Arc::clone(&verifier))) as Box<dyn Strategy>
        });
    }

    let tokens = deps.tokens;
    registry.register(token::NAME, move |creds| {
        Box::new(TokenStrategy::new(creds, Arc::clone(&tokens))) as Box<dyn Strategy>
    });

    let (backend, keys, op_timeout) = (deps.backend, deps.keys, deps.op_timeout);
    registry.register(sms::NAME, move |creds| {
        Box::new(
            SmsStrategy::new(creds, Arc::clone(&backend), keys.clone()).with_op_timeout(op_timeout),
        ) as Box<dyn Strategy>
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use crate::testing::StaticVerifier;

    fn deps(verifier: Option<Arc<dyn CredentialVerifier>>) -> StrategyDeps {
        StrategyDeps {
            verifier,
            tokens: Arc::new(TokenIssuer::new(b"s")),
            backend: Arc::new(MemoryBackend::new()),
            keys: Keyspace::default(),
            op_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn pap_requires_a_verifier() {
        assert_eq!(builtin_registry(deps(None)).names(), vec!["sms", "token"]);

        let verifier: Arc<dyn CredentialVerifier> = Arc::new(StaticVerifier::unavailable());
        assert_eq!(
            builtin_registry(deps(Some(verifier))).names(),
            vec!["pap", "sms", "token"]
        );
    }
}
