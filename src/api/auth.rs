// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential admission (`POST /portal/auth`).
//!
//! 1. Resolve the policy for the username (no protocol hint yet)
//! 2. Select, gate and build the strategy
//! 3. Authenticate
//! 4. Re-resolve the policy with the authenticator's reply attributes
//! 5. Decide the role and write the session

use std::collections::HashMap;
use std::time::Duration;

use axum::{extract::State, Json};

use super::portal::{admit, Admission};
use crate::{
    audit::{AuditEvent, AuditEventType},
    decision::{AuthOutcome, RequestAttributes, StrategyError},
    error::ApiError,
    models::{AuthRequest, AuthResponse},
    state::AppState,
    store::{AccessContext, AuthInfo},
    trust::Signed,
};

#[utoipa::path(
    post,
    path = "/portal/auth",
    request_body = AuthRequest,
    tag = "Portal",
    responses(
        (status = 200, description = "Credentials accepted and session written", body = AuthResponse),
        (status = 400, description = "Malformed JSON"),
        (status = 401, description = "Authentication failed or signature rejected"),
        (status = 403, description = "Policy does not permit this authentication"),
        (status = 422, description = "Missing credential field"),
        (status = 502, description = "Credential verifier unavailable"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn authenticate(
    State(state): State<AppState>,
    signed: Signed,
) -> Result<Json<AuthResponse>, ApiError> {
    let req: AuthRequest = signed.json()?;
    let username = req.username.trim().to_string();
    let audit = AuditEvent::new(AuditEventType::PortalAuth).with_identity(req.identity(&username));

    let pre = state
        .policies
        .resolve(&username, &HashMap::new())
        .await
        .inspect_err(|e| {
            state
                .audit
                .record(audit.clone().with_result(e.error_code()).with_detail(e.to_string()));
        })?;

    let strategy = state
        .selector
        .select_and_build(&pre.policy, req.requested_strategy(), req.credentials())
        .await
        .inspect_err(|e| {
            tracing::info!(username = %username, reason = e.error_code(), "authentication denied by policy");
            state
                .audit
                .record(audit.clone().with_result(e.error_code()).with_detail(e.to_string()));
        })?;
    let method = strategy.name();

    let result = match strategy.authenticate().await {
        Ok(AuthOutcome::Accepted(result)) => result,
        Ok(AuthOutcome::Rejected) => {
            tracing::info!(username = %username, strategy = method, "credentials rejected");
            state.audit.record(audit.with_result("rejected").with_detail(method));
            return Err(ApiError::unauthorized("authentication failed"));
        }
        Err(StrategyError::MissingField(field)) => {
            return Err(ApiError::unprocessable(format!("missing {field}")));
        }
        Err(StrategyError::Transient(cause)) => {
            tracing::error!(strategy = method, error = %cause, "authentication backend failed");
            state.audit.record(audit.with_result("auth_error").with_detail(method));
            return Err(ApiError::bad_gateway("auth service error"));
        }
    };

    // A Filter-Id in the reply may select a different policy.
    let resolved = match state
        .policies
        .resolve(&result.username, &result.reply_attrs)
        .await
    {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!(username = %result.username, error = %e, "post-auth policy resolution failed; keeping pre-auth policy");
            pre
        }
    };
    let policy = &resolved.policy;

    let identity = req.identity(&result.username);
    let attrs = RequestAttributes {
        mac: Some(identity.clone()),
        ssid: req.ssid.clone(),
        auth: Some(method.to_string()),
        ap_id: req.ap_id.clone(),
        ip: req.user_ip.clone(),
        ..Default::default()
    };
    let decision = state.rules.decide(&attrs, &state.config.default_role);
    let role = decision.role.clone();
    let rule = decision.matched_rule.clone();

    let ttl = result
        .session_timeout
        .filter(|secs| *secs > 0)
        .or(Some(policy.session_timeout).filter(|secs| *secs > 0))
        .map(Duration::from_secs)
        .unwrap_or_else(|| state.config.session_ttl_for(&role));

    let redirect_url = [req.redirect_url.as_deref(), Some(policy.redirect_url.as_str())]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| !url.is_empty())
        .map(str::to_string)
        .or_else(|| state.default_redirect_url.clone());

    let lookup = admit(
        &state,
        Admission {
            identity: identity.clone(),
            decision,
            access: AccessContext {
                ap_id: req.ap_id.clone(),
                ssid: req.ssid.clone(),
                radio_id: None,
            },
            auth: AuthInfo {
                method: Some(method.to_string()),
                source: Some(resolved.source.to_string()),
            },
            ip: req.user_ip.clone(),
            ttl,
        },
    )
    .await?;

    tracing::info!(
        identity = %identity,
        strategy = method,
        policy = %policy.name,
        source = %resolved.source,
        role = %role,
        ttl = lookup.ttl_secs,
        "credential admission"
    );
    state.audit.record(
        audit
            .admitted(&role, &lookup.session.profile, lookup.ttl_secs)
            .with_policy_version(&lookup.session.policy_version)
            .with_rule(rule)
            .with_source(Some(resolved.source.to_string()))
            .with_detail(method),
    );

    Ok(Json(AuthResponse {
        success: true,
        identity,
        role,
        ttl: lookup.ttl_secs,
        policy: policy.name.clone(),
        policy_source: resolved.source.to_string(),
        strategy: method.to_string(),
        redirect_url,
        reply_attrs: result.reply_attrs,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Bytes;
    use axum::http::StatusCode;

    use super::*;
    use crate::decision::FILTER_ID_ATTR;
    use crate::store::{KvBackend, Keyspace, MemoryBackend};
    use crate::strategies::{CredentialVerifier, VerifierReply};
    use crate::testing::{self, StaticVerifier};

    fn signed(body: serde_json::Value) -> Signed {
        Signed {
            identity: None,
            body: Bytes::from(body.to_string()),
        }
    }

    fn state_with_verifier(reply: VerifierReply) -> AppState {
        let verifier: Arc<dyn CredentialVerifier> = Arc::new(StaticVerifier::accepting("alice", "pw", reply));
        testing::state_with(Arc::new(MemoryBackend::new()), Some(verifier))
    }

    fn accepted(attrs: &[(&str, &str)]) -> VerifierReply {
        VerifierReply {
            accepted: true,
            reply_attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            session_timeout: None,
        }
    }

    #[tokio::test]
    async fn default_policy_admission_uses_profile_ttl_and_policy_redirect() {
        let state = state_with_verifier(accepted(&[]));
        let Json(resp) = authenticate(
            State(state.clone()),
            signed(serde_json::json!({
                "username": "alice", "password": "pw", "mac": "AA:BB:CC:00:01:01", "user_ip": "10.0.0.7"
            })),
        )
        .await
        .expect("admitted");

        assert!(resp.success);
        assert_eq!(resp.identity, "aa:bb:cc:00:01:01");
        assert_eq!(resp.strategy, "pap");
        assert_eq!(resp.policy, "default");
        assert_eq!(resp.policy_source, "default");
        assert_eq!(resp.role, "guest");
        assert_eq!(resp.ttl, 300);
        assert_eq!(resp.redirect_url.as_deref(), Some("https://portal.example/welcome"));

        let by_ip = state.sessions.get_by_ip("10.0.0.7").await.unwrap().unwrap();
        assert_eq!(by_ip.session.identity, "aa:bb:cc:00:01:01");
        assert_eq!(by_ip.session.auth.method.as_deref(), Some("pap"));
    }

    #[tokio::test]
    async fn filter_id_reply_switches_policy_and_ttl() {
        let state = state_with_verifier(accepted(&[(FILTER_ID_ATTR, "staff")]));
        let Json(resp) = authenticate(
            State(state),
            signed(serde_json::json!({
                "username": "alice", "password": "pw", "redirect_url": "https://example.org/"
            })),
        )
        .await
        .unwrap();

        assert_eq!(resp.identity, "alice");
        assert_eq!(resp.policy, "staff");
        assert_eq!(resp.policy_source, "protocol_hint");
        assert_eq!(resp.ttl, 7200);
        assert_eq!(resp.redirect_url.as_deref(), Some("https://example.org/"));
        assert_eq!(resp.reply_attrs.get(FILTER_ID_ATTR).map(String::as_str), Some("staff"));
    }

    #[tokio::test]
    async fn verifier_session_timeout_wins() {
        let mut reply = accepted(&[(FILTER_ID_ATTR, "staff")]);
        reply.session_timeout = Some(600);
        let state = state_with_verifier(reply);

        let Json(resp) = authenticate(
            State(state),
            signed(serde_json::json!({"username": "alice", "password": "pw"})),
        )
        .await
        .unwrap();
        assert_eq!(resp.ttl, 600);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let state = state_with_verifier(accepted(&[]));
        let err = authenticate(
            State(state.clone()),
            signed(serde_json::json!({"username": "alice", "password": "nope", "mac": "aa:bb"})),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "authentication failed");
        assert!(state.sessions.get("aa:bb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verifier_outage_is_bad_gateway() {
        let verifier: Arc<dyn CredentialVerifier> = Arc::new(StaticVerifier::unavailable());
        let state = testing::state_with(Arc::new(MemoryBackend::new()), Some(verifier));
        let err = authenticate(
            State(state),
            signed(serde_json::json!({"username": "alice", "password": "pw"})),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.message, "auth service error");
    }

    #[tokio::test]
    async fn strategy_outside_policy_is_forbidden() {
        let state = state_with_verifier(accepted(&[]));
        let err = authenticate(
            State(state),
            signed(serde_json::json!({"username": "alice", "password": "pw", "auth_type": "radius"})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_pap_verifier_is_unknown_strategy() {
        let state = testing::state();
        let err = authenticate(
            State(state),
            signed(serde_json::json!({"username": "alice", "password": "pw"})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn sms_code_admits_once() {
        let state = testing::state();
        let key = Keyspace::default().sms_code("+15550100");
        state
            .backend
            .set(&key, "424242", Duration::from_secs(300))
            .await
            .unwrap();

        let body = serde_json::json!({
            "phone": "+15550100", "code": "424242", "auth_type": "sms", "mac": "aa:bb:cc:00:01:02"
        });
        let Json(resp) = authenticate(State(state.clone()), signed(body.clone()))
            .await
            .unwrap();
        assert_eq!(resp.strategy, "sms");
        assert_eq!(resp.identity, "aa:bb:cc:00:01:02");

        let err = authenticate(State(state), signed(body)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_credentials_are_unprocessable() {
        let state = state_with_verifier(accepted(&[]));
        let err = authenticate(State(state), signed(serde_json::json!({"username": "alice"})))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.message, "missing password");
    }
}
