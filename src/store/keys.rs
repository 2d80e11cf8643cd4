// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Backend key layout.
//!
//! ```text
//! {prefix}session:id:{identity}       # session payload
//! {prefix}session:ip:{ip}             # IP -> identity index
//! {prefix}portal:nonce:{nonce}        # consumed replay nonce
//! {prefix}policy:user:{username}      # live policy override
//! {prefix}feature:{strategy}          # global strategy switch
//! {prefix}feature:{strategy}:user:{u} # per-user strategy switch
//! {prefix}sms:code:{phone}            # pending one-time sms code
//! ```

/// Namespaced key builder shared by every backend consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Join parts with `:` under the prefix.
    pub fn raw(&self, parts: &[&str]) -> String {
        format!("{}{}", self.prefix, parts.join(":"))
    }

    /// Identities are free text, so they get their own segment and can
    /// never land on an index key.
    pub fn session(&self, identity: &str) -> String {
        self.raw(&["session", "id", identity])
    }

    pub fn session_ip(&self, ip: &str) -> String {
        self.raw(&["session", "ip", ip])
    }

    pub fn nonce(&self, nonce: &str) -> String {
        self.raw(&["portal", "nonce", nonce])
    }

    pub fn policy_override(&self, username: &str) -> String {
        self.raw(&["policy", "user", username])
    }

    pub fn feature(&self, strategy: &str) -> String {
        self.raw(&["feature", strategy])
    }

    pub fn feature_user(&self, strategy: &str, user: &str) -> String {
        self.raw(&["feature", strategy, "user", user])
    }

    pub fn sms_code(&self, phone: &str) -> String {
        self.raw(&["sms", "code", phone])
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new("nac:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed_and_colon_joined() {
        let ks = Keyspace::new("t:");
        assert_eq!(ks.session("aa:bb"), "t:session:id:aa:bb");
        assert_eq!(ks.session_ip("10.0.0.2"), "t:session:ip:10.0.0.2");
        assert_eq!(ks.nonce("abc"), "t:portal:nonce:abc");
        assert_eq!(ks.feature_user("sms", "bob"), "t:feature:sms:user:bob");
    }

    #[test]
    fn ip_shaped_identity_stays_out_of_the_index() {
        let ks = Keyspace::new("t:");
        assert_ne!(ks.session("ip:10.0.0.7"), ks.session_ip("10.0.0.7"));
        assert!(!ks.session("ip:10.0.0.7").starts_with("t:session:ip:"));
    }
}
