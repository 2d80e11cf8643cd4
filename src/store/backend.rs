// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TTL key-value backend abstraction.
//!
//! All shared mutable admission state (sessions, nonce markers, policy
//! overrides, feature gates) lives behind this trait so that any number of
//! controller replicas observe the same state. The only operation that must
//! be strictly atomic is [`KvBackend::set_nx`]: the replay defense depends on
//! exactly one caller winning per nonce.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

/// Error type for backend round-trips.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend did not answer within the operation timeout.
    #[error("backend operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend could not be reached or refused the operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// A single write in an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    pub ttl: Duration,
}

impl KvEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }
}

/// TTL-capable key-value store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Unconditionally write a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;

    /// Create the key only if it does not exist. Returns `true` when this
    /// call created it.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, BackendError>;

    /// Write every entry as one indivisible batch.
    async fn set_batch(&self, entries: &[KvEntry]) -> Result<(), BackendError>;

    /// Reset the TTL of a live key. Returns `false` when the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError>;

    /// Remaining TTL of a live key, `None` when the key does not exist.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, BackendError>;

    /// Delete keys as one batch. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, BackendError>;

    async fn exists(&self, key: &str) -> Result<bool, BackendError>;

    async fn ping(&self) -> Result<(), BackendError>;
}

/// Run a backend round-trip with a hard deadline.
///
/// A timeout fails only this operation; callers decide whether that means
/// "not admitted" (reads) or an explicit error (writes).
pub async fn bounded<T, F>(limit: Duration, op: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(limit)),
    }
}
