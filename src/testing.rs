// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared test fixtures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderValue, Method, Request};
use axum::response::Response;

use crate::config::{ControllerConfig, Settings, TOKEN_SECRET_ENV};
use crate::state::AppState;
use crate::store::{BackendError, KvBackend, KvEntry, MemoryBackend};
use crate::strategies::{CredentialVerifier, VerifierError, VerifierReply};
use crate::trust::protocol::HEADER_CLIENT_MAC;
use crate::trust::KeySet;

pub const PORTAL_SECRET: &[u8] = b"portal-test-secret";
pub const TOKEN_SECRET: &str = "token-test-secret";

pub const CONTROLLER_DOC: &str = r#"{
    "controller": {"id": "ctl-1", "site": "hq", "name": "lobby", "version": "7"},
    "default_role": "guest",
    "roles": {
        "guest": {"profile": "guest-profile"},
        "staff": {"profile": "staff-profile"}
    },
    "profiles": {
        "guest-profile": {"vlan": 20, "firewall_group": "guests", "session_ttl": 300},
        "staff-profile": {"vlan": 10, "firewall_group": "staff", "session_ttl": 3600}
    },
    "role_rules": [
        {"name": "staff-ssid", "priority": 10, "when": {"ssid": "Staff"}, "assign": "staff"}
    ],
    "policies": [
        {"name": "default", "allowed": ["pap", "token", "sms"], "default_strategy": "pap",
         "session_timeout": 0, "redirect_url": "https://portal.example/welcome"},
        {"name": "staff", "allowed": ["pap"], "default_strategy": "pap", "session_timeout": 7200}
    ],
    "bypass": {"enabled": true, "mac_whitelist": ["00:11:22:33:44:55"]},
    "dataplane": {"policy_version": 3, "portal_ip": "10.0.0.1", "lan_if": "br-lan"}
}"#;

/// Backend where every operation fails.
pub struct FailingBackend;

fn down<T>() -> Result<T, BackendError> {
    Err(BackendError::Unavailable("backend down".to_string()))
}

#[async_trait]
impl KvBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, BackendError> {
        down()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), BackendError> {
        down()
    }

    async fn set_nx(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, BackendError> {
        down()
    }

    async fn set_batch(&self, _entries: &[KvEntry]) -> Result<(), BackendError> {
        down()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, BackendError> {
        down()
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, BackendError> {
        down()
    }

    async fn delete(&self, _keys: &[String]) -> Result<usize, BackendError> {
        down()
    }

    async fn exists(&self, _key: &str) -> Result<bool, BackendError> {
        down()
    }

    async fn ping(&self) -> Result<(), BackendError> {
        down()
    }
}

/// Verifier with one known credential pair, or none at all.
pub struct StaticVerifier {
    known: Option<(String, String, VerifierReply)>,
}

impl StaticVerifier {
    /// Answers `reply` for the pair, a plain rejection for anything else.
    pub fn accepting(username: &str, password: &str, reply: VerifierReply) -> Self {
        Self {
            known: Some((username.to_string(), password.to_string(), reply)),
        }
    }

    /// Always fails as if the verifier could not be reached.
    pub fn unavailable() -> Self {
        Self { known: None }
    }
}

#[async_trait]
impl CredentialVerifier for StaticVerifier {
    async fn verify(&self, username: &str, password: &str) -> Result<VerifierReply, VerifierError> {
        match &self.known {
            None => Err(VerifierError::Transient("connection refused".to_string())),
            Some((user, pw, reply)) if user == username && pw == password => Ok(reply.clone()),
            Some(_) => Ok(VerifierReply::rejected()),
        }
    }
}

pub fn settings() -> Settings {
    Settings::from_lookup(|name| (name == TOKEN_SECRET_ENV).then(|| TOKEN_SECRET.to_string()))
        .expect("test settings")
}

pub fn controller_config() -> ControllerConfig {
    ControllerConfig::from_json(CONTROLLER_DOC).expect("test controller document")
}

/// State over a fresh in-process backend.
pub fn state() -> AppState {
    state_with(Arc::new(MemoryBackend::new()), None)
}

pub fn state_with(
    backend: Arc<dyn KvBackend>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
) -> AppState {
    AppState::new(
        &settings(),
        controller_config(),
        KeySet::single("v1", PORTAL_SECRET.to_vec()),
        backend,
        verifier,
    )
}

/// Request signed with the state's current key.
pub fn signed_request(
    state: &AppState,
    method: Method,
    uri: &str,
    body: &str,
    client_mac: Option<&str>,
) -> Request<Body> {
    let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
    let sig = state
        .trust
        .sign(method.as_str(), path, query, body.as_bytes(), None)
        .expect("sign");

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    sig.apply(request.headers_mut());
    if let Some(mac) = client_mac {
        request
            .headers_mut()
            .insert(HEADER_CLIENT_MAC, HeaderValue::from_str(mac).expect("mac header"));
    }
    request
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
