// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Store
//!
//! Externalizes session existence and TTL so every controller replica
//! observes the same admission state.
//!
//! ## Layout
//!
//! - `backend` - the [`KvBackend`] trait every consumer talks to
//! - `memory` - in-process TTL backend
//! - `keys` - key namespacing
//! - `sessions` - session put/get/refresh/delete with the IP index
//! - `sweeper` - background purge of expired in-process entries
//!
//! ## Failure Posture
//!
//! Reads that hit a backend error are reported as errors here and downgraded
//! to "not admitted" at the request boundary. Writes surface their errors so
//! an admission never appears to succeed when it did not.

pub mod backend;
pub mod keys;
pub mod memory;
pub mod sessions;
pub mod sweeper;

pub use backend::{bounded, BackendError, KvBackend, KvEntry};
pub use keys::Keyspace;
pub use memory::MemoryBackend;
pub use sessions::{
    normalize_identity, AccessContext, AssignedAttributes, AuthInfo, MatchedRule, Session,
    SessionLookup, SessionStore, SessionTimestamps, StoreError, StoreResult,
    DEFAULT_OP_TIMEOUT, SESSION_SCHEMA_VERSION,
};
pub use sweeper::ExpirySweeper;
