// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HMAC request signing and verification between the portal edge and the
//! controller.
//!
//! ## Headers
//!
//! | Header | |
//! |---|---|
//! | `X-Portal-Kid` | key id, optional (defaults to the current key) |
//! | `X-Portal-Timestamp` | unix seconds |
//! | `X-Portal-Nonce` | single-use random token |
//! | `X-Portal-Signature` | base64 HMAC-SHA256 over the canonical string |
//! | `X-Client-MAC` | identity asserted by the edge, trusted only after verification |
//!
//! ## Verification order
//!
//! 1. Signature (constant-time compare)
//! 2. Timestamp window `[now - 300s, now + 60s]`
//! 3. Nonce consumption (atomic create-if-absent, 10 minute marker)
//!
//! The nonce is consumed last so a forged request cannot burn a nonce that a
//! legitimate request is about to use.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64ct::{Base64, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use super::canonical::canonical_string;
use super::error::TrustError;
use super::keys::KeySet;
use crate::store::{bounded, normalize_identity, KvBackend, Keyspace, DEFAULT_OP_TIMEOUT};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_KID: HeaderName = HeaderName::from_static("x-portal-kid");
pub const HEADER_TIMESTAMP: HeaderName = HeaderName::from_static("x-portal-timestamp");
pub const HEADER_NONCE: HeaderName = HeaderName::from_static("x-portal-nonce");
pub const HEADER_SIGNATURE: HeaderName = HeaderName::from_static("x-portal-signature");
pub const HEADER_CLIENT_MAC: HeaderName = HeaderName::from_static("x-client-mac");

/// Accepted clock lag.
pub const MAX_PAST_SKEW_SECS: i64 = 300;
/// Accepted clock lead.
pub const MAX_FUTURE_SKEW_SECS: i64 = 60;
/// Lifetime of a consumed-nonce marker.
pub const NONCE_TTL: Duration = Duration::from_secs(600);

/// Output of [`TrustProtocol::sign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustSignature {
    pub key_id: String,
    pub timestamp: i64,
    pub nonce: String,
    pub signature: String,
}

impl TrustSignature {
    /// Write the trust headers onto an outgoing request.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let pairs = [
            (HEADER_KID, self.key_id.as_str()),
            (HEADER_NONCE, self.nonce.as_str()),
            (HEADER_SIGNATURE, self.signature.as_str()),
        ];
        for (name, value) in pairs {
            if let Ok(v) = HeaderValue::from_str(value) {
                headers.insert(name, v);
            }
        }
        headers.insert(HEADER_TIMESTAMP, HeaderValue::from(self.timestamp));
    }
}

/// A request that passed every trust check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedRequest {
    pub key_id: String,
    pub nonce: String,
    /// Normalized `X-Client-MAC`, when the edge asserted one.
    pub identity: Option<String>,
}

/// Signs and verifies portal requests against a [`KeySet`].
#[derive(Clone)]
pub struct TrustProtocol {
    keys: Arc<KeySet>,
    backend: Arc<dyn KvBackend>,
    keyspace: Keyspace,
    op_timeout: Duration,
}

impl TrustProtocol {
    pub fn new(keys: Arc<KeySet>, backend: Arc<dyn KvBackend>, keyspace: Keyspace) -> Self {
        Self {
            keys,
            backend,
            keyspace,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Whether usable key material is loaded.
    pub fn is_initialized(&self) -> bool {
        self.keys.current_key().is_some()
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    /// Sign a request under `kid`, or the current key when `None`.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &[u8],
        kid: Option<&str>,
    ) -> Result<TrustSignature, TrustError> {
        self.sign_at(Utc::now().timestamp(), method, path, query, body, kid)
    }

    /// [`sign`](Self::sign) with an explicit timestamp.
    pub fn sign_at(
        &self,
        timestamp: i64,
        method: &str,
        path: &str,
        query: &str,
        body: &[u8],
        kid: Option<&str>,
    ) -> Result<TrustSignature, TrustError> {
        let key_id = kid.unwrap_or(self.keys.current_kid());
        let key = self.keys.key(key_id).ok_or(TrustError::NotInitialized)?;

        let nonce = Uuid::new_v4().to_string();
        let timestamp_str = timestamp.to_string();
        let canonical = canonical_string(&timestamp_str, &nonce, method, path, query, body);

        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| TrustError::NotInitialized)?;
        mac.update(canonical.as_bytes());
        let signature = Base64::encode_string(&mac.finalize().into_bytes());

        Ok(TrustSignature {
            key_id: key_id.to_string(),
            timestamp,
            nonce,
            signature,
        })
    }

    /// Verify a signed request against the current clock.
    pub async fn verify(
        &self,
        headers: &HeaderMap,
        method: &str,
        path: &str,
        query: &str,
        body: &[u8],
    ) -> Result<TrustedRequest, TrustError> {
        self.verify_at(Utc::now().timestamp(), headers, method, path, query, body)
            .await
    }

    /// [`verify`](Self::verify) with an explicit `now`.
    pub async fn verify_at(
        &self,
        now: i64,
        headers: &HeaderMap,
        method: &str,
        path: &str,
        query: &str,
        body: &[u8],
    ) -> Result<TrustedRequest, TrustError> {
        if self.keys.is_empty() || !self.is_initialized() {
            return Err(TrustError::NotInitialized);
        }

        let timestamp = header(headers, &HEADER_TIMESTAMP).ok_or(TrustError::InvalidSignature)?;
        let nonce = header(headers, &HEADER_NONCE).ok_or(TrustError::InvalidSignature)?;
        let signature = header(headers, &HEADER_SIGNATURE).ok_or(TrustError::InvalidSignature)?;
        let key_id = header(headers, &HEADER_KID).unwrap_or(self.keys.current_kid());

        let key = self.keys.key(key_id).ok_or(TrustError::InvalidSignature)?;
        let provided = Base64::decode_vec(signature).map_err(|_| TrustError::InvalidSignature)?;

        let canonical = canonical_string(timestamp, nonce, method, path, query, body);
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| TrustError::InvalidSignature)?;
        mac.update(canonical.as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| TrustError::InvalidSignature)?;

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| TrustError::TimestampOutOfRange)?;
        if ts < now - MAX_PAST_SKEW_SECS || ts > now + MAX_FUTURE_SKEW_SECS {
            return Err(TrustError::TimestampOutOfRange);
        }

        self.consume_nonce(nonce).await?;

        let identity = header(headers, &HEADER_CLIENT_MAC)
            .map(normalize_identity)
            .filter(|id| !id.is_empty());

        Ok(TrustedRequest {
            key_id: key_id.to_string(),
            nonce: nonce.to_string(),
            identity,
        })
    }

    async fn consume_nonce(&self, nonce: &str) -> Result<(), TrustError> {
        let key = self.keyspace.nonce(nonce);
        match bounded(self.op_timeout, self.backend.set_nx(&key, "1", NONCE_TTL)).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TrustError::ReplayDetected),
            Err(e) => {
                tracing::warn!(error = %e, "nonce marker write failed");
                Err(TrustError::ReplayDetected)
            }
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::MemoryBackend;
    use crate::testing::FailingBackend;

    const T: i64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"mac":"AA:BB:CC:DD:EE:FF"}"#;

    fn protocol() -> TrustProtocol {
        TrustProtocol::new(
            Arc::new(KeySet::single("v1", b"portal-secret".to_vec())),
            Arc::new(MemoryBackend::new()),
            Keyspace::new("test:"),
        )
    }

    fn signed_headers(sig: &TrustSignature) -> HeaderMap {
        let mut headers = HeaderMap::new();
        sig.apply(&mut headers);
        headers
    }

    #[tokio::test]
    async fn sign_then_verify_round_trips() {
        let trust = protocol();
        let sig = trust.sign("POST", "/portal/login", "", BODY, None).unwrap();
        assert_eq!(sig.key_id, "v1");

        let mut headers = signed_headers(&sig);
        headers.insert(HEADER_CLIENT_MAC, HeaderValue::from_static(" AA:BB:CC:DD:EE:FF "));

        let verified = trust
            .verify(&headers, "POST", "/portal/login", "", BODY)
            .await
            .unwrap();
        assert_eq!(verified.identity.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(verified.nonce, sig.nonce);
    }

    #[tokio::test]
    async fn second_use_of_a_nonce_is_a_replay() {
        let trust = protocol();
        let sig = trust.sign_at(T, "GET", "/portal/status/aa", "", b"", None).unwrap();
        let headers = signed_headers(&sig);

        assert!(trust
            .verify_at(T, &headers, "GET", "/portal/status/aa", "", b"")
            .await
            .is_ok());
        assert_eq!(
            trust
                .verify_at(T, &headers, "GET", "/portal/status/aa", "", b"")
                .await,
            Err(TrustError::ReplayDetected)
        );
    }

    #[tokio::test]
    async fn timestamp_window_is_inclusive_and_asymmetric() {
        let trust = protocol();
        let cases = [
            (T - 300, true),
            (T - 301, false),
            (T + 60, true),
            (T + 61, false),
        ];
        for (ts, accepted) in cases {
            let sig = trust.sign_at(ts, "POST", "/p", "", b"", None).unwrap();
            let result = trust
                .verify_at(T, &signed_headers(&sig), "POST", "/p", "", b"")
                .await;
            if accepted {
                assert!(result.is_ok(), "ts offset {} should pass", ts - T);
            } else {
                assert_eq!(result, Err(TrustError::TimestampOutOfRange), "ts offset {}", ts - T);
            }
        }
    }

    #[tokio::test]
    async fn tampered_body_or_query_fails_signature() {
        let trust = protocol();
        let sig = trust.sign_at(T, "POST", "/p", "a=1", BODY, None).unwrap();
        let headers = signed_headers(&sig);

        assert_eq!(
            trust.verify_at(T, &headers, "POST", "/p", "a=1", b"{}").await,
            Err(TrustError::InvalidSignature)
        );
        assert_eq!(
            trust.verify_at(T, &headers, "POST", "/p", "a=2", BODY).await,
            Err(TrustError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn bad_signature_does_not_burn_the_nonce() {
        let trust = protocol();
        let sig = trust.sign_at(T, "POST", "/p", "", BODY, None).unwrap();

        let mut forged = signed_headers(&sig);
        forged.insert(
            HEADER_SIGNATURE,
            HeaderValue::from_static("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
        );
        assert_eq!(
            trust.verify_at(T, &forged, "POST", "/p", "", BODY).await,
            Err(TrustError::InvalidSignature)
        );

        // The genuine request with the same nonce still goes through.
        assert!(trust
            .verify_at(T, &signed_headers(&sig), "POST", "/p", "", BODY)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn missing_or_malformed_headers_are_invalid_signature() {
        let trust = protocol();
        let sig = trust.sign_at(T, "POST", "/p", "", b"", None).unwrap();

        for name in [HEADER_TIMESTAMP, HEADER_NONCE, HEADER_SIGNATURE] {
            let mut headers = signed_headers(&sig);
            headers.remove(&name);
            assert_eq!(
                trust.verify_at(T, &headers, "POST", "/p", "", b"").await,
                Err(TrustError::InvalidSignature)
            );
        }

        let mut headers = signed_headers(&sig);
        headers.insert(HEADER_SIGNATURE, HeaderValue::from_static("%%%"));
        assert_eq!(
            trust.verify_at(T, &headers, "POST", "/p", "", b"").await,
            Err(TrustError::InvalidSignature)
        );

        let mut headers = signed_headers(&sig);
        headers.insert(HEADER_KID, HeaderValue::from_static("v404"));
        assert_eq!(
            trust.verify_at(T, &headers, "POST", "/p", "", b"").await,
            Err(TrustError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn non_numeric_timestamp_is_out_of_range() {
        let trust = protocol();
        // Sign over the literal string so the signature itself is valid.
        let key = trust.keys().current_key().unwrap().to_vec();
        let canonical = canonical_string("yesterday", "n-1", "POST", "/p", "", b"");
        let mut mac = HmacSha256::new_from_slice(&key).unwrap();
        mac.update(canonical.as_bytes());
        let signature = Base64::encode_string(&mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_TIMESTAMP, HeaderValue::from_static("yesterday"));
        headers.insert(HEADER_NONCE, HeaderValue::from_static("n-1"));
        headers.insert(HEADER_SIGNATURE, HeaderValue::from_str(&signature).unwrap());

        assert_eq!(
            trust.verify_at(T, &headers, "POST", "/p", "", b"").await,
            Err(TrustError::TimestampOutOfRange)
        );
    }

    #[tokio::test]
    async fn any_registered_key_verifies_during_rotation() {
        let mut keys = HashMap::new();
        keys.insert("v1".to_string(), b"old".to_vec());
        keys.insert("v2".to_string(), b"new".to_vec());
        let trust = TrustProtocol::new(
            Arc::new(KeySet::new("v2", keys).unwrap()),
            Arc::new(MemoryBackend::new()),
            Keyspace::new("test:"),
        );

        let old = trust.sign_at(T, "POST", "/p", "", b"", Some("v1")).unwrap();
        let new = trust.sign_at(T, "POST", "/p", "", b"", None).unwrap();
        assert_eq!(new.key_id, "v2");
        assert_ne!(old.signature, new.signature);

        assert!(trust.verify_at(T, &signed_headers(&old), "POST", "/p", "", b"").await.is_ok());
        assert!(trust.verify_at(T, &signed_headers(&new), "POST", "/p", "", b"").await.is_ok());

        // Without a kid header the current key is assumed.
        let mut headers = signed_headers(&old);
        headers.remove(HEADER_KID);
        assert_eq!(
            trust.verify_at(T, &headers, "POST", "/p", "", b"").await,
            Err(TrustError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn empty_key_material_is_not_initialized() {
        let trust = TrustProtocol::new(
            Arc::new(KeySet::single("v1", Vec::new())),
            Arc::new(MemoryBackend::new()),
            Keyspace::new("test:"),
        );
        assert!(!trust.is_initialized());
        assert_eq!(
            trust.verify_at(T, &HeaderMap::new(), "GET", "/", "", b"").await,
            Err(TrustError::NotInitialized)
        );
    }

    #[tokio::test]
    async fn unreachable_backend_rejects_as_replay() {
        let trust = TrustProtocol::new(
            Arc::new(KeySet::single("v1", b"portal-secret".to_vec())),
            Arc::new(FailingBackend),
            Keyspace::new("test:"),
        );
        let sig = trust.sign_at(T, "POST", "/p", "", b"", None).unwrap();
        assert_eq!(
            trust.verify_at(T, &signed_headers(&sig), "POST", "/p", "", b"").await,
            Err(TrustError::ReplayDetected)
        );
    }
}
