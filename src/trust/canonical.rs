// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Canonical string over which portal request signatures are computed.
//!
//! ```text
//! {timestamp}\n{nonce}\n{METHOD}\n{path}\n{query}\n{hex(sha256(body))}\n
//! ```
//!
//! The query string is taken verbatim (no re-ordering or re-encoding); both
//! sides must sign exactly what travels on the wire.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of the raw request body.
pub fn body_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Build the canonical string for one request.
pub fn canonical_string(
    timestamp: &str,
    nonce: &str,
    method: &str,
    path: &str,
    query: &str,
    body: &[u8],
) -> String {
    format!(
        "{timestamp}\n{nonce}\n{method}\n{path}\n{query}\n{}\n",
        body_hash(body)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_hash_is_sha256_of_nothing() {
        assert_eq!(
            body_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn canonical_layout_is_newline_terminated() {
        let s = canonical_string("1700000000", "n-1", "POST", "/portal/login", "a=1", b"");
        let lines: Vec<&str> = s.split('\n').collect();
        assert_eq!(
            lines,
            vec![
                "1700000000",
                "n-1",
                "POST",
                "/portal/login",
                "a=1",
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
                "",
            ]
        );
    }

    #[test]
    fn body_changes_the_canonical_string() {
        let a = canonical_string("1", "n", "POST", "/p", "", b"{\"mac\":\"a\"}");
        let b = canonical_string("1", "n", "POST", "/p", "", b"{\"mac\":\"b\"}");
        assert_ne!(a, b);
    }
}
