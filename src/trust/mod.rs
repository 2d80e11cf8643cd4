// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Trust between the portal edge and the controller.
//!
//! Portal requests are signed with a shared HMAC key ([`TrustProtocol`]);
//! admitted clients receive short-lived bearer tokens ([`TokenIssuer`]) that
//! the gateway presents back on auth subrequests.

pub mod canonical;
pub mod error;
pub mod extractor;
pub mod keys;
pub mod protocol;
pub mod token;

pub use error::TrustError;
pub use extractor::Signed;
pub use keys::{KeyLoadError, KeySet};
pub use protocol::{TrustProtocol, TrustSignature, TrustedRequest};
pub use token::{IssuedToken, TokenClaims, TokenError, TokenIssuer};
