// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, process::ExitCode, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use integration_auth_server::{
    api::router,
    auth::{
        AppAuthenticationProxy, AuthenticationProxy, HttpAppPairingApi, HttpAuthApi,
        IdentityStore,
    },
    bootstrap::bootstrap_all,
    config::{Settings, LOG_FORMAT_ENV},
    state::AppState,
};

const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    init_tracing();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let Some(app_identity) = settings.app_identity.clone() else {
        error!("No integration identity configured; set INTEGRATION_IDENTITIES");
        return ExitCode::FAILURE;
    };

    let auth = Arc::new(
        AuthenticationProxy::new(
            IdentityStore::new(settings.http),
            Arc::new(HttpAuthApi::session(settings.session_auth_url.as_str())),
            Arc::new(HttpAuthApi::key_manager(settings.key_manager_auth_url.as_str())),
        )
        .with_reauth_grace(settings.reauth_grace)
        .with_expected_identities(settings.identities.iter().map(|c| c.identity.clone())),
    );

    // Pairing runs as the app identity, over its client and session.
    let app_auth = AppAuthenticationProxy::new(
        Arc::clone(&auth),
        app_identity,
        Arc::new(HttpAppPairingApi::new(settings.app_pairing_url.as_str())),
    );

    let shutdown = CancellationToken::new();
    let handle = Handle::new();

    // Identities come up in the background; readiness reports 503 until then.
    tokio::spawn({
        let auth = Arc::clone(&auth);
        let identities = settings.identities.clone();
        let policy = settings.bootstrap;
        let shutdown = shutdown.clone();
        async move {
            let outcomes = bootstrap_all(auth, &identities, policy, shutdown).await;
            let failed = outcomes.iter().filter(|(_, o)| o.is_err()).count();
            if failed > 0 {
                warn!(failed, total = outcomes.len(), "Some identities failed to bootstrap");
            }
        }
    });

    tokio::spawn({
        let shutdown = shutdown.clone();
        let handle = handle.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            shutdown.cancel();
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    let app = router(AppState::new(auth, app_auth));

    let addr: SocketAddr = match format!("{}:{}", settings.host, settings.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, host = %settings.host, "Failed to parse bind address");
            return ExitCode::FAILURE;
        }
    };

    let served = match &settings.tls {
        Some(tls) => {
            let config = match RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await {
                Ok(config) => config,
                Err(e) => {
                    error!(error = %e, "Failed to load server TLS certificate");
                    return ExitCode::FAILURE;
                }
            };
            info!(%addr, "Integration auth server listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!(%addr, "Integration auth server listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
