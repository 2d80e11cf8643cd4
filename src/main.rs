// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, error::Error, path::PathBuf, sync::Arc};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use portal_controller::{
    api::router,
    config::{reload_policies, ControllerConfig, Settings, LOG_FORMAT_ENV},
    decision::PolicyTable,
    state::AppState,
    store::{ExpirySweeper, MemoryBackend},
    strategies::{CredentialVerifier, HttpCredentialVerifier},
    trust::KeySet,
};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().pretty().with_target(true)).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "portal controller failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let settings = Settings::from_env()?;

    let keys = KeySet::load(
        &settings.hmac_secret_dir,
        settings.hmac_current_kid.as_deref(),
        settings.hmac_fallback_secret.as_deref(),
    )?;
    info!(current_kid = keys.current_kid(), keys = keys.len(), "portal signing keys loaded");

    let config = ControllerConfig::load(&settings.controller_config)?;
    info!(
        path = %settings.controller_config.display(),
        version = %config.controller.version,
        roles = config.roles.len(),
        rules = config.role_rules.len(),
        policies = config.policies.len(),
        "controller document loaded"
    );

    let verifier = match &settings.verifier_url {
        Some(url) => {
            let verifier = HttpCredentialVerifier::new(url.clone(), settings.verifier_timeout)?;
            Some(Arc::new(verifier) as Arc<dyn CredentialVerifier>)
        }
        None => {
            warn!("no credential verifier configured; pap is unavailable");
            None
        }
    };

    let backend = Arc::new(MemoryBackend::new());
    let state = AppState::new(&settings, config, keys, backend.clone(), verifier);

    let shutdown = CancellationToken::new();
    tokio::spawn(ExpirySweeper::new(backend).run(shutdown.clone()));
    spawn_policy_reload(
        settings.controller_config.clone(),
        Arc::clone(state.policies.table()),
        shutdown.clone(),
    );

    let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    info!(addr = %listener.local_addr()?, "portal controller listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("portal controller stopped");
    Ok(())
}

/// Swap the policy table on SIGHUP. A bad document keeps the current table.
#[cfg(unix)]
fn spawn_policy_reload(path: PathBuf, table: Arc<PolicyTable>, shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGHUP; policy reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = hangup.recv() => match reload_policies(&path) {
                    Ok(policies) => {
                        info!(policies = policies.len(), "policy table reloaded");
                        table.replace(policies);
                    }
                    Err(e) => warn!(error = %e, "policy reload failed; keeping current table"),
                },
                _ = shutdown.cancelled() => return,
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_policy_reload(_path: PathBuf, _table: Arc<PolicyTable>, _shutdown: CancellationToken) {}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown requested");
    shutdown.cancel();
}
