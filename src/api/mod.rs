// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::{Bypass, ControllerInfo, Dataplane, Profile, RoleDef},
    models::{
        AuthRequest, AuthResponse, BatchEntry, BatchItem, BatchStatusRequest,
        BatchStatusResponse, IdentityRequest, LoginRequest, ProfileView, SessionView,
        TokenResponse,
    },
    runtime::{ControllerVersion, RuntimePolicy},
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod portal;
pub mod runtime;
pub mod token;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/portal/login", post(portal::login))
        .route("/portal/heartbeat", post(portal::heartbeat))
        .route("/portal/logout", post(portal::logout))
        .route("/portal/status/{mac}", get(portal::status))
        .route("/portal/status/ip/{ip}", get(portal::status_by_ip))
        .route("/portal/batch_status", post(portal::batch_status))
        .route("/portal/auth", post(auth::authenticate))
        .route("/portal/token", post(token::issue_token))
        .route("/portal/auth_check", get(token::auth_check))
        .route("/api/v1/policy/runtime", get(runtime::runtime_policy))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        portal::login,
        portal::heartbeat,
        portal::logout,
        portal::status,
        portal::status_by_ip,
        portal::batch_status,
        auth::authenticate,
        token::issue_token,
        token::auth_check,
        runtime::runtime_policy
    ),
    components(
        schemas(
            LoginRequest,
            IdentityRequest,
            SessionView,
            ProfileView,
            BatchEntry,
            BatchStatusRequest,
            BatchItem,
            BatchStatusResponse,
            AuthRequest,
            AuthResponse,
            TokenResponse,
            RuntimePolicy,
            ControllerVersion,
            ControllerInfo,
            RoleDef,
            Profile,
            Bypass,
            Dataplane,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Portal", description = "Signed session lifecycle calls from the portal edge"),
        (name = "Tokens", description = "Bearer tokens and gateway auth subrequests"),
        (name = "Policy", description = "Runtime policy export for enforcement points")
    )
)]
struct ApiDoc;
