// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed audit trail for admission decisions.
//!
//! Every admission, heartbeat, logout, token issuance and trust rejection
//! produces one [`AuditEvent`]. Events are serialized with sorted keys,
//! signed with HMAC-SHA256 (hex, field `sig`) and emitted as one JSON line on
//! the `audit` tracing target. Without a secret, auditing is disabled.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::trust::TrustError;

type HmacSha256 = Hmac<Sha256>;

/// Tracing target for audit lines.
pub const AUDIT_TARGET: &str = "audit";

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    #[serde(rename = "portal.login")]
    PortalLogin,
    #[serde(rename = "portal.heartbeat")]
    PortalHeartbeat,
    #[serde(rename = "portal.logout")]
    PortalLogout,
    #[serde(rename = "portal.auth")]
    PortalAuth,
    #[serde(rename = "portal.token")]
    TokenIssued,
    #[serde(rename = "portal.trust_rejected")]
    TrustRejected,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEvent {
    pub event_id: String,
    /// Unix seconds.
    pub ts: i64,
    pub event: AuditEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub authorized: bool,
    /// `ok`, `not_found`, `rejected`, ...
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            ts: Utc::now().timestamp(),
            event,
            identity: None,
            authorized: false,
            result: "ok".to_string(),
            role: None,
            profile: None,
            ttl: None,
            policy_version: None,
            rule: None,
            source: None,
            detail: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Mark the identity as admitted with a role, profile and TTL.
    pub fn admitted(mut self, role: impl Into<String>, profile: impl Into<String>, ttl: u64) -> Self {
        self.authorized = true;
        self.role = Some(role.into());
        self.profile = Some(profile.into());
        self.ttl = Some(ttl);
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = result.into();
        self
    }

    pub fn with_policy_version(mut self, version: impl Into<String>) -> Self {
        self.policy_version = Some(version.into());
        self
    }

    pub fn with_rule(mut self, rule: Option<String>) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source.filter(|s| !s.is_empty());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Signs and emits audit events.
#[derive(Clone, Default)]
pub struct AuditLogger {
    secret: Option<Vec<u8>>,
}

impl AuditLogger {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        let secret = secret.into();
        Self {
            secret: (!secret.is_empty()).then_some(secret),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    fn sign(&self, payload: &[u8]) -> Option<String> {
        let secret = self.secret.as_deref()?;
        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(payload);
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Serialized, signed line for an event. `None` when disabled.
    pub fn signed_line(&self, event: &AuditEvent) -> Option<String> {
        self.secret.as_ref()?;
        let mut value = serde_json::to_value(event).ok()?;
        let payload = serde_json::to_string(&value).ok()?;
        let sig = self.sign(payload.as_bytes())?;
        value
            .as_object_mut()?
            .insert("sig".to_string(), serde_json::Value::String(sig));
        serde_json::to_string(&value).ok()
    }

    /// Check the `sig` of a line produced by [`signed_line`](Self::signed_line).
    pub fn verify_line(&self, line: &str) -> bool {
        let Ok(mut value) = serde_json::from_str::<serde_json::Value>(line) else {
            return false;
        };
        let Some(sig) = value
            .as_object_mut()
            .and_then(|map| map.remove("sig"))
            .and_then(|sig| sig.as_str().map(str::to_string))
        else {
            return false;
        };
        let (Some(secret), Ok(provided), Ok(payload)) = (
            self.secret.as_deref(),
            hex::decode(sig),
            serde_json::to_string(&value),
        ) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
            return false;
        };
        mac.update(payload.as_bytes());
        mac.verify_slice(&provided).is_ok()
    }

    pub fn record(&self, event: AuditEvent) {
        if let Some(line) = self.signed_line(&event) {
            tracing::info!(target: AUDIT_TARGET, "{line}");
        }
    }

    /// Record a rejected signed request with its internal cause.
    pub fn trust_rejected(&self, path: &str, err: &TrustError) {
        self.record(
            AuditEvent::new(AuditEventType::TrustRejected)
                .with_result(err.error_code())
                .with_detail(path),
        );
    }
}
