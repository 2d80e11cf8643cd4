// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session store: the single source of truth for "is this identity admitted".
//!
//! Existence of `{prefix}session:id:{identity}` is admission; TTL expiry is an
//! implicit logout. The payload is written once at admission and only its
//! TTL moves on heartbeat. When a session carries a client IP, an
//! `IP -> identity` index entry is written in the same atomic batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::backend::{bounded, BackendError, KvBackend, KvEntry};
use super::keys::Keyspace;

/// Current session payload schema.
pub const SESSION_SCHEMA_VERSION: u32 = 2;

/// Default deadline for one backend round-trip.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Normalize an identity key (MAC address or username): trimmed, lower-cased.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Rule that produced the session's role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MatchedRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Where the client was seen when admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccessContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ap_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radio_id: Option<String>,
}

/// Enforcement attributes copied from the profile at admission time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AssignedAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall_group: Option<String>,
}

/// How the identity was authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Unix-second timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionTimestamps {
    pub created: i64,
    pub updated: i64,
}

/// One admitted identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub schema: u32,
    pub identity: String,
    pub role: String,
    pub profile: String,
    /// Policy version stamped at admission; heartbeats never re-resolve it.
    pub policy_version: String,
    #[serde(default)]
    pub rule: MatchedRule,
    #[serde(default)]
    pub access: AccessContext,
    #[serde(default)]
    pub attrs: AssignedAttributes,
    #[serde(default)]
    pub auth: AuthInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default)]
    pub ts: SessionTimestamps,
}

impl Session {
    pub fn new(identity: &str, role: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            schema: SESSION_SCHEMA_VERSION,
            identity: normalize_identity(identity),
            role: role.into(),
            profile: profile.into(),
            ..Default::default()
        }
    }
}

/// A live session and its remaining lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLookup {
    pub session: Session,
    pub ttl_secs: u64,
}

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("session payload could not be decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type for session store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Session persistence over a shared [`KvBackend`].
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KvBackend>,
    keys: Keyspace,
    op_timeout: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KvBackend>, keys: Keyspace) -> Self {
        Self {
            backend,
            keys,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Admit (or re-admit) an identity.
    ///
    /// Stamps the schema version and timestamps, then overwrites any existing
    /// entry. `ts.created` is kept when the caller carries it over from a
    /// previous admission, otherwise it is set to now. When the identity moved
    /// to a new IP, the index entry for the old one is released.
    pub async fn put(&self, mut session: Session, ttl: Duration) -> StoreResult<Session> {
        let now = Utc::now().timestamp();
        session.schema = SESSION_SCHEMA_VERSION;
        session.identity = normalize_identity(&session.identity);
        session.ip = session
            .ip
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
        if session.ts.created == 0 {
            session.ts.created = now;
        }
        session.ts.updated = now;

        let previous_ip = self.stored_ip(&session.identity).await;

        let payload = serde_json::to_string(&session)?;
        let mut batch = vec![KvEntry::new(self.keys.session(&session.identity), payload, ttl)];
        if let Some(ip) = session.ip.as_deref() {
            batch.push(KvEntry::new(
                self.keys.session_ip(ip),
                session.identity.clone(),
                ttl,
            ));
        }

        bounded(self.op_timeout, self.backend.set_batch(&batch)).await?;

        if let Some(old) = previous_ip.filter(|old| session.ip.as_deref() != Some(old.as_str())) {
            self.release_ip(&old, &session.identity).await;
        }
        Ok(session)
    }

    /// Look up a live session. `Ok(None)` means not admitted.
    pub async fn get(&self, identity: &str) -> StoreResult<Option<SessionLookup>> {
        let key = self.keys.session(&normalize_identity(identity));
        let Some(raw) = bounded(self.op_timeout, self.backend.get(&key)).await? else {
            return Ok(None);
        };
        let session: Session = serde_json::from_str(&raw)?;

        let ttl_secs = match bounded(self.op_timeout, self.backend.ttl(&key)).await {
            Ok(Some(remaining)) => round_secs(remaining),
            // Expired between the two reads.
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(identity = %session.identity, error = %e, "session ttl lookup failed");
                0
            }
        };

        Ok(Some(SessionLookup { session, ttl_secs }))
    }

    /// Resolve a client IP through the secondary index.
    ///
    /// An index entry whose session is gone, or whose session now carries a
    /// different IP, is reported as unknown.
    pub async fn get_by_ip(&self, ip: &str) -> StoreResult<Option<SessionLookup>> {
        let ip = ip.trim();
        let index_key = self.keys.session_ip(ip);
        let Some(identity) = bounded(self.op_timeout, self.backend.get(&index_key)).await? else {
            return Ok(None);
        };

        match self.get(&identity).await? {
            Some(lookup) if lookup.session.ip.as_deref() == Some(ip) => Ok(Some(lookup)),
            Some(lookup) => {
                tracing::debug!(
                    ip,
                    identity = %lookup.session.identity,
                    current_ip = lookup.session.ip.as_deref().unwrap_or("-"),
                    "stale ip index entry"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Reset the TTL without rewriting the payload.
    ///
    /// Returns `false` when the session expired before the refresh landed.
    pub async fn refresh(&self, identity: &str, ttl: Duration) -> StoreResult<bool> {
        let identity = normalize_identity(identity);
        let key = self.keys.session(&identity);
        let refreshed = bounded(self.op_timeout, self.backend.expire(&key, ttl)).await?;
        if !refreshed {
            return Ok(false);
        }

        if let Ok(Some(raw)) = bounded(self.op_timeout, self.backend.get(&key)).await {
            if let Some(ip) = serde_json::from_str::<Session>(&raw).ok().and_then(|s| s.ip) {
                if self.index_owner(&ip).await.as_deref() == Some(identity.as_str()) {
                    let index_key = self.keys.session_ip(&ip);
                    if let Err(e) = bounded(self.op_timeout, self.backend.expire(&index_key, ttl)).await {
                        tracing::debug!(identity = %identity, error = %e, "ip index refresh failed");
                    }
                }
            }
        }

        Ok(true)
    }

    /// Remove a session and its IP index entry. Idempotent.
    pub async fn delete(&self, identity: &str) -> StoreResult<bool> {
        let identity = normalize_identity(identity);
        let key = self.keys.session(&identity);

        let mut keys = vec![key.clone()];
        if let Ok(Some(raw)) = bounded(self.op_timeout, self.backend.get(&key)).await {
            if let Some(ip) = serde_json::from_str::<Session>(&raw).ok().and_then(|s| s.ip) {
                if self.index_owner(&ip).await.as_deref() == Some(identity.as_str()) {
                    keys.push(self.keys.session_ip(&ip));
                }
            }
        }

        // The index key is only added after the primary was read, so any
        // removal means the session existed.
        let removed = bounded(self.op_timeout, self.backend.delete(&keys)).await?;
        Ok(removed > 0)
    }

    /// IP recorded in the stored session, if any. Best effort.
    async fn stored_ip(&self, identity: &str) -> Option<String> {
        let key = self.keys.session(identity);
        match bounded(self.op_timeout, self.backend.get(&key)).await {
            Ok(Some(raw)) => serde_json::from_str::<Session>(&raw).ok().and_then(|s| s.ip),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(identity, error = %e, "previous session read failed");
                None
            }
        }
    }

    /// Identity the IP index currently points at. Best effort.
    async fn index_owner(&self, ip: &str) -> Option<String> {
        bounded(self.op_timeout, self.backend.get(&self.keys.session_ip(ip)))
            .await
            .ok()
            .flatten()
    }

    /// Drop the index entry for `ip` if it still points at `identity`.
    async fn release_ip(&self, ip: &str, identity: &str) {
        if self.index_owner(ip).await.as_deref() != Some(identity) {
            return;
        }
        let keys = [self.keys.session_ip(ip)];
        if let Err(e) = bounded(self.op_timeout, self.backend.delete(&keys)).await {
            tracing::warn!(ip, identity, error = %e, "stale ip index entry not released");
        }
    }
}

fn round_secs(d: Duration) -> u64 {
    ((d.as_millis() + 500) / 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryBackend::new()), Keyspace::new("test:"))
    }

    fn guest(identity: &str) -> Session {
        let mut s = Session::new(identity, "guest", "guest-profile");
        s.policy_version = "7".to_string();
        s
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["  AA:BB:CC:DD:EE:FF ", "bob", "  Alice\t", ""] {
            let once = normalize_identity(raw);
            assert_eq!(normalize_identity(&once), once);
        }
        assert_eq!(normalize_identity(" AA:BB "), "aa:bb");
    }

    #[tokio::test(start_paused = true)]
    async fn put_then_get_round_trips_role_and_profile() {
        let store = store();
        let written = store
            .put(guest("AA:BB:CC:DD:EE:FF"), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(written.identity, "aa:bb:cc:dd:ee:ff");
        assert_eq!(written.schema, SESSION_SCHEMA_VERSION);
        assert!(written.ts.created > 0);

        let found = store.get(" aa:bb:cc:dd:ee:ff ").await.unwrap().unwrap();
        assert_eq!(found.session.role, "guest");
        assert_eq!(found.session.profile, "guest-profile");
        assert_eq!(found.ttl_secs, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_extends_ttl_and_keeps_payload() {
        let store = store();
        let written = store.put(guest("m1"), Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(store.refresh("m1", Duration::from_secs(120)).await.unwrap());

        let found = store.get("m1").await.unwrap().unwrap();
        assert_eq!(found.ttl_secs, 120);
        assert_eq!(found.session.role, written.role);
        assert_eq!(found.session.profile, written.profile);
        assert_eq!(found.session.ts.created, written.ts.created);
    }

    #[tokio::test(start_paused = true)]
    async fn session_disappears_after_ttl() {
        let store = store();
        store.put(guest("m2"), Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.get("m2").await.unwrap().is_none());
        assert!(!store.refresh("m2", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = store();
        store.put(guest("m3"), Duration::from_secs(60)).await.unwrap();
        assert!(store.delete("m3").await.unwrap());
        assert!(!store.delete("m3").await.unwrap());
        assert!(!store.delete("never-seen").await.unwrap());
    }

    #[tokio::test]
    async fn put_preserves_carried_created_timestamp() {
        let store = store();
        let mut s = guest("m4");
        s.ts.created = 1_600_000_000;
        let written = store.put(s, Duration::from_secs(60)).await.unwrap();
        assert_eq!(written.ts.created, 1_600_000_000);
        assert!(written.ts.updated > written.ts.created);
    }

    #[tokio::test]
    async fn ip_index_resolves_and_is_removed_with_session() {
        let store = store();
        let mut s = guest("alice");
        s.ip = Some("10.0.0.9".to_string());
        store.put(s, Duration::from_secs(60)).await.unwrap();

        let found = store.get_by_ip("10.0.0.9").await.unwrap().unwrap();
        assert_eq!(found.session.identity, "alice");

        assert!(store.delete("alice").await.unwrap());
        assert!(store.get_by_ip("10.0.0.9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dangling_ip_index_is_unknown() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::new(backend.clone(), Keyspace::new("test:"));
        backend
            .set("test:session:ip:10.0.0.1", "ghost", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.get_by_ip("10.0.0.1").await.unwrap().is_none());
    }

    fn at_ip(identity: &str, ip: &str) -> Session {
        let mut s = guest(identity);
        s.ip = Some(ip.to_string());
        s
    }

    #[tokio::test]
    async fn readmission_on_new_ip_releases_the_old_one() {
        let store = store();
        store.put(at_ip("alice", "10.0.0.7"), Duration::from_secs(60)).await.unwrap();
        store.put(at_ip("alice", "10.0.0.8"), Duration::from_secs(60)).await.unwrap();

        assert!(store.get_by_ip("10.0.0.7").await.unwrap().is_none());
        let found = store.get_by_ip("10.0.0.8").await.unwrap().unwrap();
        assert_eq!(found.session.identity, "alice");
    }

    #[tokio::test]
    async fn index_entry_pointing_at_a_moved_session_is_unknown() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::new(backend.clone(), Keyspace::new("test:"));
        store.put(at_ip("alice", "10.0.0.8"), Duration::from_secs(60)).await.unwrap();
        backend
            .set("test:session:ip:10.0.0.7", "alice", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.get_by_ip("10.0.0.7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reassigned_ip_belongs_to_the_new_holder() {
        let store = store();
        store.put(at_ip("alice", "10.0.0.7"), Duration::from_secs(60)).await.unwrap();
        store.put(at_ip("bob", "10.0.0.7"), Duration::from_secs(60)).await.unwrap();
        store.put(at_ip("alice", "10.0.0.9"), Duration::from_secs(60)).await.unwrap();

        let found = store.get_by_ip("10.0.0.7").await.unwrap().unwrap();
        assert_eq!(found.session.identity, "bob");

        assert!(store.delete("alice").await.unwrap());
        let found = store.get_by_ip("10.0.0.7").await.unwrap().unwrap();
        assert_eq!(found.session.identity, "bob");
    }

    #[tokio::test]
    async fn ip_shaped_identity_does_not_clobber_the_index() {
        let store = store();
        store.put(guest("ip:10.0.0.7"), Duration::from_secs(60)).await.unwrap();
        store.put(at_ip("alice", "10.0.0.7"), Duration::from_secs(60)).await.unwrap();

        let found = store.get("ip:10.0.0.7").await.unwrap().unwrap();
        assert_eq!(found.session.identity, "ip:10.0.0.7");
        let by_ip = store.get_by_ip("10.0.0.7").await.unwrap().unwrap();
        assert_eq!(by_ip.session.identity, "alice");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_extends_the_ip_index_with_the_session() {
        let store = store();
        store.put(at_ip("alice", "10.0.0.7"), Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(store.refresh("alice", Duration::from_secs(120)).await.unwrap());

        tokio::time::advance(Duration::from_secs(30)).await;
        let found = store.get_by_ip("10.0.0.7").await.unwrap().unwrap();
        assert_eq!(found.session.identity, "alice");
        assert_eq!(found.ttl_secs, 90);
    }

    #[tokio::test]
    async fn corrupt_payload_is_a_codec_error_not_a_miss() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::new(backend.clone(), Keyspace::new("test:"));
        backend
            .set("test:session:id:bad", "{not json", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(matches!(store.get("bad").await, Err(StoreError::Codec(_))));
    }
}
