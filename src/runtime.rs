// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Runtime policy export for enforcement points.
//!
//! Gateways pull this snapshot and cache it. `controller_version.checksum` is
//! the hex SHA-256 of `{"roles":..,"profiles":..,"bypass":..}` serialized
//! with ordered maps, recomputed on every export.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::config::{Bypass, ControllerConfig, ControllerInfo, Dataplane, Profile, RoleDef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ControllerVersion {
    pub version: String,
    pub checksum: String,
    /// Unix seconds.
    pub generated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RuntimePolicy {
    pub controller: ControllerInfo,
    pub controller_version: ControllerVersion,
    pub roles: BTreeMap<String, RoleDef>,
    pub profiles: BTreeMap<String, Profile>,
    pub bypass: Bypass,
    pub dataplane: Dataplane,
}

#[derive(Serialize)]
struct ChecksumBody<'a> {
    roles: &'a BTreeMap<String, RoleDef>,
    profiles: &'a BTreeMap<String, Profile>,
    bypass: &'a Bypass,
}

/// Hex SHA-256 over roles, profiles and bypass.
pub fn checksum(
    roles: &BTreeMap<String, RoleDef>,
    profiles: &BTreeMap<String, Profile>,
    bypass: &Bypass,
) -> Result<String, serde_json::Error> {
    let body = serde_json::to_vec(&ChecksumBody {
        roles,
        profiles,
        bypass,
    })?;
    Ok(hex::encode(Sha256::digest(&body)))
}

impl RuntimePolicy {
    pub fn build(cfg: &ControllerConfig) -> Result<Self, serde_json::Error> {
        let checksum = checksum(&cfg.roles, &cfg.profiles, &cfg.bypass)?;
        Ok(Self {
            controller: cfg.controller.clone(),
            controller_version: ControllerVersion {
                version: cfg.controller.version.clone(),
                checksum,
                generated: Utc::now().timestamp(),
            },
            roles: cfg.roles.clone(),
            profiles: cfg.profiles.clone(),
            bypass: cfg.bypass.clone(),
            dataplane: cfg.dataplane.clone(),
        })
    }
}
