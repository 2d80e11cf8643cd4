// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decision engine: who gets which role, which policy applies, and which
//! authentication method may run.

pub mod error;
pub mod feature;
pub mod pattern;
pub mod policy;
pub mod roles;
pub mod selector;
pub mod strategy;

pub use error::DecisionError;
pub use feature::{AllowAllGate, FeatureGate, KvFeatureGate};
pub use pattern::Pattern;
pub use policy::{
    KvPolicyOverride, Policy, PolicyEngine, PolicyOverride, PolicySource, PolicyTable,
    ResolvedPolicy, FILTER_ID_ATTR,
};
pub use roles::{Attribute, Decision, RequestAttributes, RoleRule, RuleSet};
pub use selector::StrategySelector;
pub use strategy::{
    AuthOutcome, AuthResult, Credentials, Strategy, StrategyBuilder, StrategyError,
    StrategyRegistry,
};
