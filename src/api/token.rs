// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer tokens for admitted clients and the gateway auth subrequest.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};

use crate::{
    audit::{AuditEvent, AuditEventType},
    error::ApiError,
    models::TokenResponse,
    state::AppState,
    trust::Signed,
};

/// Issue a token for the trusted `X-Client-MAC` identity.
///
/// Only identities with a live session get a token.
#[utoipa::path(
    post,
    path = "/portal/token",
    tag = "Tokens",
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Signature rejected or client not admitted"),
        (status = 422, description = "No trusted client identity")
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    signed: Signed,
) -> Result<Json<TokenResponse>, ApiError> {
    let identity = signed.identity_or(None)?;

    let live = match state.sessions.get(&identity).await {
        Ok(found) => found.is_some(),
        Err(e) => {
            tracing::warn!(identity = %identity, error = %e, "session lookup failed; refusing token");
            false
        }
    };
    if !live {
        return Err(ApiError::unauthorized("not_authorized"));
    }

    let issued = state.tokens.issue(&identity).map_err(|e| {
        tracing::error!(identity = %identity, error = %e, "token signing failed");
        ApiError::internal("token signing failed")
    })?;

    state.audit.record(
        AuditEvent::new(AuditEventType::TokenIssued)
            .with_identity(&identity)
            .with_result("ok"),
    );

    Ok(Json(TokenResponse {
        token: issued.token,
        ttl: issued.ttl_secs,
    }))
}

/// Gateway auth subrequest: `204` when the bearer token is valid and its
/// subject still holds a live session, `401` otherwise.
#[utoipa::path(
    get,
    path = "/portal/auth_check",
    tag = "Tokens",
    params(("Authorization" = String, Header, description = "`Bearer <token>`")),
    responses(
        (status = 204, description = "Token valid and session live"),
        (status = 401, description = "Missing, invalid or expired token, or no session")
    )
)]
pub async fn auth_check(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let Some(token) = bearer(&headers) else {
        return StatusCode::UNAUTHORIZED;
    };

    let claims = match state.tokens.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "bearer token rejected");
            return StatusCode::UNAUTHORIZED;
        }
    };

    match state.sessions.get(&claims.sub).await {
        Ok(Some(_)) => StatusCode::NO_CONTENT,
        Ok(None) => StatusCode::UNAUTHORIZED,
        Err(e) => {
            tracing::warn!(subject = %claims.sub, error = %e, "session lookup failed during auth check");
            StatusCode::UNAUTHORIZED
        }
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
