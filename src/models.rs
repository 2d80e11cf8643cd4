// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the portal API. All types derive
//! `ToSchema` for the OpenAPI document; request types default every field
//! so that a missing field surfaces as a domain error (`mac_required`)
//! instead of a deserialization failure.
//!
//! ## Model Categories
//!
//! - **Sessions**: login, heartbeat, logout and status views
//! - **Batch**: multi-identity status lookups
//! - **Credentials**: `/portal/auth` admission
//! - **Tokens**: bearer-token issuance

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::decision::{Credentials, RequestAttributes};
use crate::store::{normalize_identity, SessionLookup};

// =============================================================================
// Sessions
// =============================================================================

/// Attributes observed by the portal when a client logs in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginRequest {
    /// Client MAC. Falls back to the trusted `X-Client-MAC` header.
    pub mac: Option<String>,
    pub ssid: Option<String>,
    /// Access method reported by the portal (e.g. `click`, `pap`).
    pub auth: Option<String>,
    pub ap_id: Option<String>,
    pub radio_id: Option<String>,
    pub ip: Option<String>,
    pub os: Option<String>,
    /// Free-form tag of the calling component, audit only.
    pub source: Option<String>,
}

impl LoginRequest {
    /// Attribute bag for role matching, keyed by the resolved identity.
    pub fn attributes(&self, identity: &str) -> RequestAttributes {
        RequestAttributes {
            mac: Some(identity.to_string()),
            ssid: self.ssid.clone(),
            auth: self.auth.clone(),
            ap_id: self.ap_id.clone(),
            radio_id: self.radio_id.clone(),
            ip: self.ip.clone(),
            os: self.os.clone(),
        }
    }
}

/// Heartbeat and logout body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct IdentityRequest {
    pub mac: Option<String>,
    pub source: Option<String>,
}

/// Profile attributes attached to an admitted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProfileView {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall_group: Option<String>,
}

/// Admission state of one identity.
///
/// `role` and `ttl` are always present (`null` when not admitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    pub authorized: bool,
    pub role: Option<String>,
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileView>,
}

impl SessionView {
    pub fn not_authorized() -> Self {
        Self {
            authorized: false,
            role: None,
            ttl: None,
            policy_version: None,
            profile: None,
        }
    }

    pub fn admitted(lookup: &SessionLookup) -> Self {
        let session = &lookup.session;
        Self {
            authorized: true,
            role: Some(session.role.clone()),
            ttl: Some(lookup.ttl_secs),
            policy_version: Some(session.policy_version.clone()),
            profile: Some(ProfileView {
                name: session.profile.clone(),
                vlan: session.attrs.vlan,
                firewall_group: session.attrs.firewall_group.clone(),
            }),
        }
    }
}

impl From<Option<SessionLookup>> for SessionView {
    fn from(lookup: Option<SessionLookup>) -> Self {
        lookup
            .as_ref()
            .map(SessionView::admitted)
            .unwrap_or_else(SessionView::not_authorized)
    }
}

// =============================================================================
// Batch
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct BatchEntry {
    pub mac: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct BatchStatusRequest {
    pub entries: Vec<BatchEntry>,
}

/// One batch result. Unadmitted identities carry no role or profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchItem {
    pub mac: String,
    pub authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileView>,
}

impl BatchItem {
    pub fn new(mac: String, view: SessionView) -> Self {
        Self {
            mac,
            authorized: view.authorized,
            role: view.role,
            ttl: view.ttl,
            policy_version: view.policy_version,
            profile: view.profile,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BatchStatusResponse {
    pub results: Vec<BatchItem>,
}

// =============================================================================
// Credentials
// =============================================================================

/// Credential admission request from the portal UI.
#[derive(Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
    pub token: String,
    pub phone: String,
    pub code: String,
    pub mac: Option<String>,
    pub user_ip: Option<String>,
    pub ssid: Option<String>,
    pub ap_id: Option<String>,
    /// Requested strategy (`pap`, `token`, `sms`). Policy default when absent.
    pub auth_type: Option<String>,
    pub redirect_url: Option<String>,
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("mac", &self.mac)
            .field("user_ip", &self.user_ip)
            .field("auth_type", &self.auth_type)
            .finish_non_exhaustive()
    }
}

impl AuthRequest {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
            phone: self.phone.clone(),
            code: self.code.clone(),
        }
    }

    /// Session key: the MAC when given, else the username.
    pub fn identity(&self, authenticated_user: &str) -> String {
        self.mac
            .as_deref()
            .map(normalize_identity)
            .filter(|mac| !mac.is_empty())
            .unwrap_or_else(|| normalize_identity(authenticated_user))
    }

    pub fn requested_strategy(&self) -> Option<&str> {
        self.auth_type.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub identity: String,
    pub role: String,
    pub ttl: u64,
    pub policy: String,
    /// `override`, `protocol_hint` or `default`.
    pub policy_source: String,
    pub strategy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub reply_attrs: HashMap<String, String>,
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    /// Seconds.
    pub ttl: u64,
}
