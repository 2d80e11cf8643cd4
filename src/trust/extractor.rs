// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for signed portal requests.
//!
//! ```rust,ignore
//! async fn login(State(state): State<AppState>, signed: Signed) -> Result<..., ApiError> {
//!     let req: LoginRequest = signed.json()?;
//! }
//! ```
//!
//! The extractor buffers the body (it is part of the signature), verifies the
//! trust headers and hands the verified identity and raw body to the handler.
//! It must be the last extractor of a handler.

use axum::{
    body::{to_bytes, Bytes},
    extract::{FromRequest, Request},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use super::protocol::HEADER_CLIENT_MAC;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::normalize_identity;

/// Largest signed body accepted.
pub const MAX_SIGNED_BODY_BYTES: usize = 64 * 1024;

/// A verified portal request.
#[derive(Debug, Clone)]
pub struct Signed {
    /// Trusted `X-Client-MAC`, normalized.
    pub identity: Option<String>,
    pub body: Bytes,
}

impl Signed {
    /// Decode the body as JSON, `400 bad_json` on failure.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|_| ApiError::bad_request("bad_json"))
    }

    /// Identity from the body when present, else the trusted header.
    pub fn identity_or(&self, from_body: Option<&str>) -> Result<String, ApiError> {
        from_body
            .map(normalize_identity)
            .filter(|id| !id.is_empty())
            .or_else(|| self.identity.clone())
            .ok_or_else(|| ApiError::unprocessable("mac_required"))
    }
}

impl FromRequest<AppState> for Signed {
    type Rejection = Response;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let body = to_bytes(body, MAX_SIGNED_BODY_BYTES)
            .await
            .map_err(|_| ApiError::payload_too_large("body too large").into_response())?;

        if state.skip_trust_verification {
            return Ok(Signed {
                identity: unverified_identity(&parts.headers),
                body,
            });
        }

        let path = parts.uri.path();
        let query = parts.uri.query().unwrap_or("");
        match state
            .trust
            .verify(&parts.headers, parts.method.as_str(), path, query, &body)
            .await
        {
            Ok(trusted) => Ok(Signed {
                identity: trusted.identity,
                body,
            }),
            Err(e) => {
                state.audit.trust_rejected(path, &e);
                Err(e.into_response())
            }
        }
    }
}

fn unverified_identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get(HEADER_CLIENT_MAC)
        .and_then(|v| v.to_str().ok())
        .map(normalize_identity)
        .filter(|id| !id.is_empty())
}
