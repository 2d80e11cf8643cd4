// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session lifecycle endpoints called by the portal edge.
//!
//! All routes here require a signed request. Read paths are fail-closed: a
//! backend error is reported as "not admitted". Write paths surface backend
//! errors as `503`.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    audit::{AuditEvent, AuditEventType},
    decision::Decision,
    error::ApiError,
    models::{
        BatchItem, BatchStatusRequest, BatchStatusResponse, IdentityRequest, LoginRequest,
        SessionView,
    },
    state::AppState,
    store::{
        normalize_identity, AccessContext, AssignedAttributes, AuthInfo, MatchedRule, Session,
        SessionLookup,
    },
    trust::Signed,
};

/// Everything needed to write a new session.
pub(crate) struct Admission {
    pub identity: String,
    pub decision: Decision,
    pub access: AccessContext,
    pub auth: AuthInfo,
    pub ip: Option<String>,
    pub ttl: Duration,
}

/// Stamp profile attributes and the policy version, then persist.
///
/// Returns the session as read back from the store.
pub(crate) async fn admit(state: &AppState, admission: Admission) -> Result<SessionLookup, ApiError> {
    let Admission {
        identity,
        decision,
        access,
        auth,
        ip,
        ttl,
    } = admission;

    let (profile_name, attrs) = match state.config.profile_for(&decision.role) {
        Some((name, profile)) => (
            name.to_string(),
            AssignedAttributes {
                vlan: Some(profile.vlan),
                firewall_group: Some(profile.firewall_group.clone())
                    .filter(|group| !group.is_empty()),
            },
        ),
        None => {
            tracing::warn!(role = %decision.role, "role has no profile; admitting without attributes");
            (String::new(), AssignedAttributes::default())
        }
    };

    let mut session = Session::new(&identity, decision.role, profile_name);
    session.policy_version = state.policy_version().to_string();
    session.rule = MatchedRule {
        name: decision.matched_rule,
        priority: decision.priority,
    };
    session.access = access;
    session.attrs = attrs;
    session.auth = auth;
    session.ip = ip.filter(|ip| !ip.trim().is_empty());

    let stored = state.sessions.put(session, ttl).await?;

    match state.sessions.get(&stored.identity).await {
        Ok(Some(lookup)) => Ok(lookup),
        Ok(None) => Err(ApiError::service_unavailable("session not persisted")),
        Err(e) => {
            tracing::warn!(identity = %stored.identity, error = %e, "session read-back failed");
            Ok(SessionLookup {
                session: stored,
                ttl_secs: ttl.as_secs(),
            })
        }
    }
}

/// Session lookup with read-path failures downgraded to "not admitted".
async fn lookup(state: &AppState, identity: &str) -> Option<SessionLookup> {
    match state.sessions.get(identity).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(identity, error = %e, "session lookup failed; treating as not admitted");
            None
        }
    }
}

/// Admit a client from the attributes observed by the portal.
#[utoipa::path(
    post,
    path = "/portal/login",
    request_body = LoginRequest,
    tag = "Portal",
    responses(
        (status = 200, description = "Client admitted", body = SessionView),
        (status = 400, description = "Malformed JSON"),
        (status = 401, description = "Request signature rejected"),
        (status = 422, description = "No client identity"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn login(State(state): State<AppState>, signed: Signed) -> Result<Json<SessionView>, ApiError> {
    let req: LoginRequest = signed.json()?;
    let identity = signed.identity_or(req.mac.as_deref())?;

    let decision = state
        .rules
        .decide(&req.attributes(&identity), &state.config.default_role);
    let ttl = state.config.session_ttl_for(&decision.role);
    let rule = decision.matched_rule.clone();

    let lookup = admit(
        &state,
        Admission {
            identity: identity.clone(),
            decision,
            access: AccessContext {
                ap_id: req.ap_id.clone(),
                ssid: req.ssid.clone(),
                radio_id: req.radio_id.clone(),
            },
            auth: AuthInfo {
                method: req.auth.clone(),
                source: req.source.clone(),
            },
            ip: req.ip.clone(),
            ttl,
        },
    )
    .await?;

    let session = &lookup.session;
    tracing::info!(
        identity = %identity,
        role = %session.role,
        rule = rule.as_deref().unwrap_or("-"),
        ttl = lookup.ttl_secs,
        "client admitted"
    );
    state.audit.record(
        AuditEvent::new(AuditEventType::PortalLogin)
            .with_identity(&identity)
            .admitted(&session.role, &session.profile, lookup.ttl_secs)
            .with_policy_version(&session.policy_version)
            .with_rule(rule)
            .with_source(req.source),
    );

    Ok(Json(SessionView::admitted(&lookup)))
}

/// Extend a live session to the role's current profile TTL.
#[utoipa::path(
    post,
    path = "/portal/heartbeat",
    request_body = IdentityRequest,
    tag = "Portal",
    responses(
        (status = 200, description = "Refreshed session, or not authorized", body = SessionView),
        (status = 401, description = "Request signature rejected"),
        (status = 422, description = "No client identity"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn heartbeat(
    State(state): State<AppState>,
    signed: Signed,
) -> Result<Json<SessionView>, ApiError> {
    let req: IdentityRequest = signed.json()?;
    let identity = signed.identity_or(req.mac.as_deref())?;
    let event = AuditEvent::new(AuditEventType::PortalHeartbeat)
        .with_identity(&identity)
        .with_source(req.source);

    let Some(current) = lookup(&state, &identity).await else {
        state.audit.record(event.with_result("not_found"));
        return Ok(Json(SessionView::not_authorized()));
    };

    let ttl = state.config.session_ttl_for(&current.session.role);
    let refreshed = state.sessions.refresh(&identity, ttl).await?;
    let after = if refreshed {
        lookup(&state, &identity).await
    } else {
        None
    };

    let Some(after) = after else {
        state.audit.record(event.with_result("expired_after_refresh"));
        return Ok(Json(SessionView::not_authorized()));
    };

    state.audit.record(
        event
            .admitted(&after.session.role, &after.session.profile, after.ttl_secs)
            .with_policy_version(&after.session.policy_version),
    );
    Ok(Json(SessionView::admitted(&after)))
}

/// Remove a session. Always answers `authorized: false`.
#[utoipa::path(
    post,
    path = "/portal/logout",
    request_body = IdentityRequest,
    tag = "Portal",
    responses(
        (status = 200, description = "Session removed (or already absent)", body = SessionView),
        (status = 401, description = "Request signature rejected"),
        (status = 422, description = "No client identity"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn logout(State(state): State<AppState>, signed: Signed) -> Result<Json<SessionView>, ApiError> {
    let req: IdentityRequest = signed.json()?;
    let identity = signed.identity_or(req.mac.as_deref())?;

    let existed = state.sessions.delete(&identity).await?;
    tracing::info!(identity = %identity, existed, "client logged out");
    state.audit.record(
        AuditEvent::new(AuditEventType::PortalLogout)
            .with_identity(&identity)
            .with_result(if existed { "ok" } else { "not_found" })
            .with_source(req.source),
    );

    Ok(Json(SessionView::not_authorized()))
}

#[utoipa::path(
    get,
    path = "/portal/status/{mac}",
    params(("mac" = String, Path, description = "Client MAC address")),
    tag = "Portal",
    responses(
        (status = 200, description = "Admission state", body = SessionView),
        (status = 401, description = "Request signature rejected")
    )
)]
pub async fn status(
    State(state): State<AppState>,
    Path(mac): Path<String>,
    _signed: Signed,
) -> Json<SessionView> {
    let identity = normalize_identity(&mac);
    if identity.is_empty() {
        return Json(SessionView::not_authorized());
    }
    Json(lookup(&state, &identity).await.into())
}

/// Admission state of whichever identity holds `ip`.
#[utoipa::path(
    get,
    path = "/portal/status/ip/{ip}",
    params(("ip" = String, Path, description = "Client IP address")),
    tag = "Portal",
    responses(
        (status = 200, description = "Admission state", body = SessionView),
        (status = 401, description = "Request signature rejected")
    )
)]
pub async fn status_by_ip(
    State(state): State<AppState>,
    Path(ip): Path<String>,
    _signed: Signed,
) -> Json<SessionView> {
    let found = match state.sessions.get_by_ip(&ip).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(ip = %ip, error = %e, "ip lookup failed; treating as not admitted");
            None
        }
    };
    Json(found.into())
}

/// Per-identity status. A miss never fails the batch.
#[utoipa::path(
    post,
    path = "/portal/batch_status",
    request_body = BatchStatusRequest,
    tag = "Portal",
    responses(
        (status = 200, description = "One result per entry, in request order", body = BatchStatusResponse),
        (status = 400, description = "Malformed JSON"),
        (status = 401, description = "Request signature rejected")
    )
)]
pub async fn batch_status(
    State(state): State<AppState>,
    signed: Signed,
) -> Result<Json<BatchStatusResponse>, ApiError> {
    let req: BatchStatusRequest = signed.json()?;

    let mut results = Vec::with_capacity(req.entries.len());
    for entry in req.entries {
        let mac = entry.mac.as_deref().map(normalize_identity).unwrap_or_default();
        let view = if mac.is_empty() {
            SessionView::not_authorized()
        } else {
            lookup(&state, &mac).await.into()
        };
        results.push(BatchItem::new(mac, view));
    }

    Ok(Json(BatchStatusResponse { results }))
}
