// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};

use crate::{error::ApiError, runtime::RuntimePolicy, state::AppState};

pub const HEADER_POLICY_VERSION: HeaderName = HeaderName::from_static("x-policy-version");
pub const HEADER_POLICY_CHECKSUM: HeaderName = HeaderName::from_static("x-policy-checksum");

/// Runtime policy snapshot for enforcement points.
///
/// The checksum is recomputed on every call.
#[utoipa::path(
    get,
    path = "/api/v1/policy/runtime",
    tag = "Policy",
    responses(
        (status = 200, description = "Current runtime policy", body = RuntimePolicy,
         headers(
             ("X-Policy-Version" = String, description = "Human-assigned policy version"),
             ("X-Policy-Checksum" = String, description = "Hex SHA-256 of roles, profiles and bypass")
         ))
    )
)]
pub async fn runtime_policy(State(state): State<AppState>) -> Result<Response, ApiError> {
    let policy = RuntimePolicy::build(&state.config).map_err(|e| {
        tracing::error!(error = %e, "runtime policy serialization failed");
        ApiError::internal("runtime policy unavailable")
    })?;

    let version = &policy.controller_version;
    let headers = [
        (
            HEADER_POLICY_VERSION,
            HeaderValue::from_str(&version.version).unwrap_or_else(|_| HeaderValue::from_static("")),
        ),
        (
            HEADER_POLICY_CHECKSUM,
            HeaderValue::from_str(&version.checksum).unwrap_or_else(|_| HeaderValue::from_static("")),
        ),
    ];

    Ok((headers, Json(policy)).into_response())
}
