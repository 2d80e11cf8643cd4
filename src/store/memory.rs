// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process TTL backend.
//!
//! Single-node deployments and tests run against this backend. Expired
//! entries are dropped lazily on access and in bulk by [`MemoryBackend::purge_expired`],
//! which the sweeper task calls periodically.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::backend::{BackendError, KvBackend, KvEntry};

struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Mutex-guarded map with per-key deadlines.
#[derive(Default)]
pub struct MemoryBackend {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Slot>>, BackendError> {
        self.slots
            .lock()
            .map_err(|_| BackendError::Unavailable("memory backend lock poisoned".to_string()))
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.slots.lock() {
            Ok(mut slots) => {
                let before = slots.len();
                slots.retain(|_, slot| slot.is_live(now));
                before - slots.len()
            }
            Err(_) => 0,
        }
    }

    /// Number of stored entries, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remove the key if it has expired and report whether a live entry remains.
fn live<'a>(slots: &'a mut HashMap<String, Slot>, key: &str, now: Instant) -> Option<&'a mut Slot> {
    if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
        slots.remove(key);
    }
    slots.get_mut(key)
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut slots = self.lock()?;
        Ok(live(&mut slots, key, Instant::now()).map(|slot| slot.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let mut slots = self.lock()?;
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, BackendError> {
        let mut slots = self.lock()?;
        let now = Instant::now();
        if live(&mut slots, key, now).is_some() {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn set_batch(&self, entries: &[KvEntry]) -> Result<(), BackendError> {
        // One lock acquisition: readers never see half of the batch.
        let mut slots = self.lock()?;
        let now = Instant::now();
        for entry in entries {
            slots.insert(
                entry.key.clone(),
                Slot {
                    value: entry.value.clone(),
                    expires_at: now + entry.ttl,
                },
            );
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let mut slots = self.lock()?;
        let now = Instant::now();
        match live(&mut slots, key, now) {
            Some(slot) => {
                slot.expires_at = now + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, BackendError> {
        let mut slots = self.lock()?;
        let now = Instant::now();
        Ok(live(&mut slots, key, now).map(|slot| slot.expires_at.saturating_duration_since(now)))
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, BackendError> {
        let mut slots = self.lock()?;
        let now = Instant::now();
        let mut existed = 0;
        for key in keys {
            if let Some(slot) = slots.remove(key) {
                if slot.is_live(now) {
                    existed += 1;
                }
            }
        }
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        let mut slots = self.lock()?;
        Ok(live(&mut slots, key, Instant::now()).is_some())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.lock().map(|_| ())
    }
}
