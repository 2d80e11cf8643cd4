// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decision errors. Reasons are safe to show to the end user.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    #[error("no policy found for {0:?}")]
    NoPolicyFound(String),

    #[error("no authentication strategy selected")]
    NoStrategySelected,

    #[error("authentication method {0} is not enabled")]
    FeatureDisabled(String),

    #[error("authentication method {0} is not allowed by policy")]
    StrategyNotAllowed(String),

    #[error("unknown authentication method {0}")]
    UnknownStrategy(String),
}

impl DecisionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            DecisionError::NoPolicyFound(_) => "no_policy_found",
            DecisionError::NoStrategySelected => "no_strategy_selected",
            DecisionError::FeatureDisabled(_) => "feature_disabled",
            DecisionError::StrategyNotAllowed(_) => "strategy_not_allowed",
            DecisionError::UnknownStrategy(_) => "unknown_strategy",
        }
    }
}
