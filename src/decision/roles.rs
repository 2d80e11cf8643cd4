// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role rules: a flat, priority-ordered, first-match evaluator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::pattern::Pattern;

/// Request attributes a rule may constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    Mac,
    Ssid,
    Auth,
    ApId,
    RadioId,
    Ip,
    Os,
}

impl Attribute {
    pub const ALL: [Attribute; 7] = [
        Attribute::Mac,
        Attribute::Ssid,
        Attribute::Auth,
        Attribute::ApId,
        Attribute::RadioId,
        Attribute::Ip,
        Attribute::Os,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Mac => "mac",
            Attribute::Ssid => "ssid",
            Attribute::Auth => "auth",
            Attribute::ApId => "ap_id",
            Attribute::RadioId => "radio_id",
            Attribute::Ip => "ip",
            Attribute::Os => "os",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == key)
    }
}

/// Attributes observed for one client. Any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAttributes {
    pub mac: Option<String>,
    pub ssid: Option<String>,
    pub auth: Option<String>,
    pub ap_id: Option<String>,
    pub radio_id: Option<String>,
    pub ip: Option<String>,
    pub os: Option<String>,
}

impl RequestAttributes {
    pub fn get(&self, attr: Attribute) -> Option<&str> {
        match attr {
            Attribute::Mac => self.mac.as_deref(),
            Attribute::Ssid => self.ssid.as_deref(),
            Attribute::Auth => self.auth.as_deref(),
            Attribute::ApId => self.ap_id.as_deref(),
            Attribute::RadioId => self.radio_id.as_deref(),
            Attribute::Ip => self.ip.as_deref(),
            Attribute::Os => self.os.as_deref(),
        }
    }
}

/// A role rule as written in the controller document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleRule {
    pub name: String,
    /// Lower value wins.
    #[serde(default)]
    pub priority: i64,
    /// Attribute name to pattern (string, list, or null).
    #[serde(default)]
    pub when: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub assign: String,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    priority: i64,
    conditions: Vec<(Attribute, Pattern)>,
    assign: String,
}

impl CompiledRule {
    fn matches(&self, attrs: &RequestAttributes) -> bool {
        self.conditions
            .iter()
            .all(|(attr, pattern)| pattern.matches(attrs.get(*attr)))
    }
}

/// Outcome of [`RuleSet::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub role: String,
    /// `None` when no rule matched and the default role was used.
    pub matched_rule: Option<String>,
    pub priority: Option<i64>,
}

/// Compiled, sorted, immutable rule set.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile and sort by `(priority, name)`.
    pub fn compile(rules: &[RoleRule]) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .iter()
            .map(|rule| {
                let conditions = rule
                    .when
                    .iter()
                    .filter_map(|(key, value)| match Attribute::from_key(key) {
                        Some(attr) => Some((attr, Pattern::compile(value))),
                        None => {
                            tracing::warn!(rule = %rule.name, attribute = %key, "unknown rule attribute ignored");
                            None
                        }
                    })
                    .collect();
                CompiledRule {
                    name: rule.name.clone(),
                    priority: rule.priority,
                    conditions,
                    assign: rule.assign.trim().to_string(),
                }
            })
            .collect();

        compiled.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Self { rules: compiled }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First matching rule wins. A rule with an empty `assign` yields the
    /// default role but still reports itself as the match.
    pub fn decide(&self, attrs: &RequestAttributes, default_role: &str) -> Decision {
        for rule in &self.rules {
            if rule.matches(attrs) {
                let role = if rule.assign.is_empty() {
                    default_role.to_string()
                } else {
                    rule.assign.clone()
                };
                return Decision {
                    role,
                    matched_rule: Some(rule.name.clone()),
                    priority: Some(rule.priority),
                };
            }
        }

        Decision {
            role: default_role.to_string(),
            matched_rule: None,
            priority: None,
        }
    }
}
