// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Two layers: process settings from the environment ([`Settings`]) and the
//! controller document, a JSON file describing roles, profiles, rules and
//! policies ([`ControllerConfig`]). Both are read once at startup; only the
//! `policies` section is reloaded on `SIGHUP`.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `CONTROLLER_CONFIG` | Controller document path | `/app/config/controller.json` |
//! | `PORTAL_HMAC_SECRET_DIR` | Directory of `portal_hmac_<kid>` files | `/run/secrets` |
//! | `PORTAL_HMAC_CURRENT_KID` | Key id used for signing | `v1` |
//! | `PORTAL_HMAC_SECRET` | Base64 fallback secret (development) | unset |
//! | `TOKEN_SIGNING_SECRET` | Bearer-token secret | Required |
//! | `TOKEN_TTL_SECS` | Bearer-token lifetime | `900` |
//! | `TOKEN_ISSUER` | Bearer-token `iss` | `ap-controller` |
//! | `AUDIT_SECRET` | Audit signature secret, auditing off when unset | unset |
//! | `KV_PREFIX` | Backend key prefix | `nac:` |
//! | `BACKEND_TIMEOUT_MS` | Per-operation backend deadline | `2000` |
//! | `CREDENTIAL_VERIFIER_URL` | Credential verifier endpoint, enables `pap` | unset |
//! | `CREDENTIAL_VERIFIER_TIMEOUT_MS` | Verifier deadline | `3000` |
//! | `FEATURE_GATES` | `backend` or `allow-all` | `allow-all` |
//! | `DEFAULT_REDIRECT_URL` | Last-resort redirect after credential login | unset |
//! | `SKIP_TRUST_VERIFICATION` | Skip portal signature checks (`dev` builds only) | `false` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::decision::{Policy, RoleRule};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const CONTROLLER_CONFIG_ENV: &str = "CONTROLLER_CONFIG";
pub const HMAC_SECRET_DIR_ENV: &str = "PORTAL_HMAC_SECRET_DIR";
pub const HMAC_CURRENT_KID_ENV: &str = "PORTAL_HMAC_CURRENT_KID";
pub const HMAC_SECRET_ENV: &str = "PORTAL_HMAC_SECRET";
pub const TOKEN_SECRET_ENV: &str = "TOKEN_SIGNING_SECRET";
pub const TOKEN_TTL_ENV: &str = "TOKEN_TTL_SECS";
pub const TOKEN_ISSUER_ENV: &str = "TOKEN_ISSUER";
pub const AUDIT_SECRET_ENV: &str = "AUDIT_SECRET";
pub const KV_PREFIX_ENV: &str = "KV_PREFIX";
pub const BACKEND_TIMEOUT_ENV: &str = "BACKEND_TIMEOUT_MS";
pub const VERIFIER_URL_ENV: &str = "CREDENTIAL_VERIFIER_URL";
pub const VERIFIER_TIMEOUT_ENV: &str = "CREDENTIAL_VERIFIER_TIMEOUT_MS";
pub const FEATURE_GATES_ENV: &str = "FEATURE_GATES";
pub const DEFAULT_REDIRECT_ENV: &str = "DEFAULT_REDIRECT_URL";
pub const SKIP_TRUST_ENV: &str = "SKIP_TRUST_VERIFICATION";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_CONTROLLER_CONFIG: &str = "/app/config/controller.json";
pub const DEFAULT_SECRET_DIR: &str = "/run/secrets";
pub const DEFAULT_KV_PREFIX: &str = "nac:";

/// Role given when no rule matches.
pub const DEFAULT_ROLE: &str = "guest";

/// Session lifetime used when a role has no profile TTL.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid controller document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where strategy feature gates are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureGateMode {
    AllowAll,
    Backend,
}

/// Process settings from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub controller_config: PathBuf,
    pub hmac_secret_dir: PathBuf,
    pub hmac_current_kid: Option<String>,
    pub hmac_fallback_secret: Option<String>,
    pub token_secret: String,
    pub token_ttl: Duration,
    pub token_issuer: Option<String>,
    pub audit_secret: Option<String>,
    pub kv_prefix: String,
    pub backend_timeout: Duration,
    pub verifier_url: Option<String>,
    pub verifier_timeout: Duration,
    pub feature_gates: FeatureGateMode,
    pub default_redirect_url: Option<String>,
    pub skip_trust_verification: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(&get, PORT_ENV, 8080u16)?;
        let token_secret = get(TOKEN_SECRET_ENV).ok_or(ConfigError::Missing(TOKEN_SECRET_ENV))?;
        let token_ttl = Duration::from_secs(parse_or(&get, TOKEN_TTL_ENV, 900u64)?);
        let backend_timeout = Duration::from_millis(parse_or(&get, BACKEND_TIMEOUT_ENV, 2000u64)?);
        let verifier_timeout = Duration::from_millis(parse_or(&get, VERIFIER_TIMEOUT_ENV, 3000u64)?);

        let feature_gates = match get(FEATURE_GATES_ENV).as_deref() {
            None | Some("allow-all") => FeatureGateMode::AllowAll,
            Some("backend") => FeatureGateMode::Backend,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: FEATURE_GATES_ENV,
                    value: other.to_string(),
                })
            }
        };

        let verifier_url = get(VERIFIER_URL_ENV).map(|v| absolute_url(VERIFIER_URL_ENV, v)).transpose()?;
        let default_redirect_url = get(DEFAULT_REDIRECT_ENV)
            .map(|v| absolute_url(DEFAULT_REDIRECT_ENV, v))
            .transpose()?;

        let skip_trust_verification = get(SKIP_TRUST_ENV)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            controller_config: get(CONTROLLER_CONFIG_ENV)
                .unwrap_or_else(|| DEFAULT_CONTROLLER_CONFIG.to_string())
                .into(),
            hmac_secret_dir: get(HMAC_SECRET_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_SECRET_DIR.to_string())
                .into(),
            hmac_current_kid: get(HMAC_CURRENT_KID_ENV),
            hmac_fallback_secret: get(HMAC_SECRET_ENV),
            token_secret,
            token_ttl,
            token_issuer: get(TOKEN_ISSUER_ENV),
            audit_secret: get(AUDIT_SECRET_ENV),
            kv_prefix: get(KV_PREFIX_ENV).unwrap_or_else(|| DEFAULT_KV_PREFIX.to_string()),
            backend_timeout,
            verifier_url,
            verifier_timeout,
            feature_gates,
            default_redirect_url,
            skip_trust_verification,
        })
    }
}

fn absolute_url(name: &'static str, raw: String) -> Result<String, ConfigError> {
    match url::Url::parse(&raw) {
        Ok(parsed) if parsed.has_host() => Ok(raw),
        _ => Err(ConfigError::Invalid { name, value: raw }),
    }
}

fn parse_or<G, T>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

/// Controller identity, as exported to enforcement points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ControllerInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub name: String,
    /// Human-assigned policy version, stamped on every session.
    #[serde(default, skip_serializing)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoleDef {
    pub profile: String,
}

/// Enforcement attributes of a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    #[serde(default)]
    pub vlan: u32,
    #[serde(default)]
    pub firewall_group: String,
    /// Seconds.
    #[serde(default)]
    pub session_ttl: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Bypass {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub enforce_order: Vec<String>,
    #[serde(default)]
    pub mac_whitelist: Vec<String>,
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Dataplane {
    #[serde(default)]
    pub policy_version: u64,
    pub portal_ip: String,
    pub lan_if: String,
    #[serde(default)]
    pub ipsets: BTreeMap<String, String>,
}

/// The controller document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub controller: ControllerInfo,
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default)]
    pub roles: BTreeMap<String, RoleDef>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub role_rules: Vec<RoleRule>,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub bypass: Bypass,
    pub dataplane: Dataplane,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

impl ControllerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(raw)?;
        if cfg.dataplane.lan_if.trim().is_empty() {
            return Err(ConfigError::Missing("dataplane.lan_if"));
        }
        if cfg.dataplane.portal_ip.trim().is_empty() {
            return Err(ConfigError::Missing("dataplane.portal_ip"));
        }
        for (role, def) in &cfg.roles {
            if !cfg.profiles.contains_key(&def.profile) {
                tracing::warn!(role = %role, profile = %def.profile, "role references an unknown profile");
            }
        }
        Ok(cfg)
    }

    /// Static policies keyed by name. Later duplicates win.
    pub fn policy_map(&self) -> HashMap<String, Policy> {
        self.policies
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect()
    }

    /// Profile name and definition for a role.
    pub fn profile_for(&self, role: &str) -> Option<(&str, &Profile)> {
        let def = self.roles.get(role)?;
        let profile = self.profiles.get(&def.profile)?;
        Some((def.profile.as_str(), profile))
    }

    /// Live profile TTL for a role, falling back to [`DEFAULT_SESSION_TTL`].
    pub fn session_ttl_for(&self, role: &str) -> Duration {
        self.profile_for(role)
            .map(|(_, p)| p.session_ttl)
            .filter(|ttl| *ttl > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SESSION_TTL)
    }
}

/// Re-read only the `policies` section of the document.
pub fn reload_policies(path: &Path) -> Result<HashMap<String, Policy>, ConfigError> {
    ControllerConfig::load(path).map(|cfg| cfg.policy_map())
}
