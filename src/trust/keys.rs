// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Portal HMAC key material.
//!
//! Keys are loaded once at startup and never mutated. Several key ids may be
//! registered at the same time so the portal edge can rotate to a new key
//! while requests signed under the previous one are still accepted.
//!
//! ## Sources
//!
//! 1. Every file named `portal_hmac_<kid>` in the secret directory
//!    (default `/run/secrets`), containing a base64 secret.
//! 2. If no file was found, a base64 fallback secret (development only)
//!    registered under the current key id.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use base64ct::{Base64, Encoding};

/// File name prefix for key files in the secret directory.
pub const KEY_FILE_PREFIX: &str = "portal_hmac_";

/// Key id used when none is configured.
pub const DEFAULT_KID: &str = "v1";

/// Error type for key loading.
#[derive(Debug, thiserror::Error)]
pub enum KeyLoadError {
    #[error("failed to read key file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("key {kid} is not valid base64")]
    Decode { kid: String },

    #[error("no portal hmac secret found")]
    NoKeys,

    #[error("current kid {0} not found")]
    CurrentKidMissing(String),
}

/// Set of shared secrets keyed by key id, plus the preferred key id.
#[derive(Clone)]
pub struct KeySet {
    current_kid: String,
    keys: HashMap<String, Vec<u8>>,
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<&String> = self.keys.keys().collect();
        kids.sort();
        f.debug_struct("KeySet")
            .field("current_kid", &self.current_kid)
            .field("kids", &kids)
            .finish()
    }
}

impl KeySet {
    /// Build a key set from raw secrets.
    pub fn new(
        current_kid: impl Into<String>,
        keys: HashMap<String, Vec<u8>>,
    ) -> Result<Self, KeyLoadError> {
        let current_kid = current_kid.into();
        if keys.is_empty() {
            return Err(KeyLoadError::NoKeys);
        }
        if !keys.contains_key(&current_kid) {
            return Err(KeyLoadError::CurrentKidMissing(current_kid));
        }
        Ok(Self { current_kid, keys })
    }

    /// Single-key set, mostly for tests and development.
    pub fn single(kid: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        let kid = kid.into();
        let mut keys = HashMap::new();
        keys.insert(kid.clone(), secret.into());
        Self {
            current_kid: kid,
            keys,
        }
    }

    /// Load from the secret directory, falling back to a base64 secret.
    ///
    /// A missing directory is not an error; only ending up with no keys is.
    pub fn load(
        secret_dir: &Path,
        current_kid: Option<&str>,
        fallback_b64: Option<&str>,
    ) -> Result<Self, KeyLoadError> {
        let current_kid = current_kid
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(DEFAULT_KID)
            .to_string();

        let mut keys = HashMap::new();

        if let Ok(entries) = fs::read_dir(secret_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let Some(kid) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix(KEY_FILE_PREFIX))
                else {
                    continue;
                };
                let kid = kid.to_string();

                let raw = fs::read_to_string(&path).map_err(|source| KeyLoadError::Read {
                    path: path.clone(),
                    source,
                })?;
                let secret = decode_secret(&kid, &raw)?;
                keys.insert(kid, secret);
            }
        }

        if keys.is_empty() {
            if let Some(b64) = fallback_b64.filter(|v| !v.trim().is_empty()) {
                let secret = decode_secret(&current_kid, b64)?;
                keys.insert(current_kid.clone(), secret);
            }
        }

        Self::new(current_kid, keys)
    }

    pub fn current_kid(&self) -> &str {
        &self.current_kid
    }

    /// Secret for a key id.
    pub fn key(&self, kid: &str) -> Option<&[u8]> {
        self.keys
            .get(kid)
            .map(Vec::as_slice)
            .filter(|k| !k.is_empty())
    }

    pub fn current_key(&self) -> Option<&[u8]> {
        self.key(&self.current_kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn decode_secret(kid: &str, raw: &str) -> Result<Vec<u8>, KeyLoadError> {
    Base64::decode_vec(raw.trim()).map_err(|_| KeyLoadError::Decode {
        kid: kid.to_string(),
    })
}
