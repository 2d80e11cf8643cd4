// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attribute match patterns for role rules.
//!
//! Rule conditions arrive as loosely typed JSON (a string, a list, or null)
//! and are compiled once at load time:
//!
//! | JSON | Pattern |
//! |---|---|
//! | `null`, `""` | [`Pattern::Wildcard`] |
//! | `"guest-*"` (contains `*` or `?`) | [`Pattern::Glob`] |
//! | `"GuestWiFi"` | [`Pattern::Exact`] |
//! | `["a", "b-*"]` | [`Pattern::AnyOf`] |
//! | anything else | `AnyOf([])`, never matches |

use globset::{GlobBuilder, GlobMatcher};
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum Pattern {
    /// Case-sensitive equality against the trimmed value.
    Exact(String),
    /// Shell glob; `*` does not cross `/`.
    Glob { source: String, matcher: GlobMatcher },
    /// Matches when any element matches.
    AnyOf(Vec<Pattern>),
    Wildcard,
}

impl Pattern {
    /// Compile a JSON condition.
    pub fn compile(value: &Value) -> Self {
        match value {
            Value::Null => Pattern::Wildcard,
            Value::String(s) => Self::from_str_pattern(s),
            Value::Array(items) => Pattern::AnyOf(items.iter().map(Self::compile).collect()),
            other => {
                tracing::warn!(pattern = %other, "unsupported rule pattern, rule condition never matches");
                Pattern::AnyOf(Vec::new())
            }
        }
    }

    fn from_str_pattern(raw: &str) -> Self {
        let p = raw.trim();
        if p.is_empty() {
            return Pattern::Wildcard;
        }
        if !p.contains(['*', '?']) {
            return Pattern::Exact(p.to_string());
        }
        match GlobBuilder::new(p).literal_separator(true).build() {
            Ok(glob) => Pattern::Glob {
                source: p.to_string(),
                matcher: glob.compile_matcher(),
            },
            Err(e) => {
                tracing::warn!(pattern = p, error = %e, "invalid glob, rule condition never matches");
                Pattern::AnyOf(Vec::new())
            }
        }
    }

    /// Match a request attribute. An absent or blank value is a wildcard.
    pub fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return true;
        };
        self.matches_value(value)
    }

    fn matches_value(&self, value: &str) -> bool {
        match self {
            Pattern::Wildcard => true,
            Pattern::Exact(p) => p == value,
            Pattern::Glob { matcher, .. } => matcher.is_match(value),
            Pattern::AnyOf(items) => items.iter().any(|p| p.matches_value(value)),
        }
    }
}
