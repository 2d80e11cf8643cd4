// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Trust protocol errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Why a signed portal request was rejected.
///
/// Each variant is a distinct fault class for logs and audit. The HTTP
/// response is identical for all of them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    /// No key material loaded
    #[error("trust keys are not initialized")]
    NotInitialized,
    /// Missing headers, unknown key id, undecodable or mismatching signature
    #[error("invalid request signature")]
    InvalidSignature,
    /// Timestamp outside `[now - 300s, now + 60s]` or not an integer
    #[error("request timestamp out of range")]
    TimestampOutOfRange,
    /// Nonce already consumed, or the nonce marker could not be written
    #[error("replayed request nonce")]
    ReplayDetected,
}

#[derive(Serialize)]
struct TrustErrorBody {
    error: &'static str,
    error_code: &'static str,
}

impl TrustError {
    /// Internal error code, for logs only.
    pub fn error_code(&self) -> &'static str {
        match self {
            TrustError::NotInitialized => "not_initialized",
            TrustError::InvalidSignature => "invalid_signature",
            TrustError::TimestampOutOfRange => "timestamp_out_of_range",
            TrustError::ReplayDetected => "replay_detected",
        }
    }
}

impl IntoResponse for TrustError {
    fn into_response(self) -> Response {
        tracing::warn!(error_code = self.error_code(), "portal request rejected: {self}");
        let body = Json(TrustErrorBody {
            error: "unauthorized",
            error_code: "unauthorized",
        });
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}
