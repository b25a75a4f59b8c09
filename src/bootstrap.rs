// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Bootstrap
//!
//! Registers every configured integration identity and obtains its first
//! session at startup. Identities bootstrap concurrently and independently:
//! a missing keystore or a rejected certificate only takes down that one
//! identity.
//!
//! ## Retry
//!
//! Only connectivity failures are retried (`retry_interval` apart, at most
//! `max_attempts` attempts in total). A 401/403 from the auth services will
//! not change by waiting, so it fails immediately.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`; a pending retry sleep ends
//! as soon as the token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::auth::{AuthError, AuthenticationProxy, KeystoreMaterial};
use crate::config::IdentityConfig;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Bootstrap of {0} cancelled")]
    Cancelled(String),
}

/// Register `identity` and authenticate it, retrying connectivity failures.
pub async fn bootstrap_identity(
    proxy: &AuthenticationProxy,
    identity: &str,
    material: &KeystoreMaterial,
    policy: RetryPolicy,
    shutdown: &CancellationToken,
) -> Result<(), BootstrapError> {
    proxy.register(identity, material)?;

    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        if shutdown.is_cancelled() {
            return Err(BootstrapError::Cancelled(identity.to_string()));
        }

        match proxy.authenticate(identity).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_connectivity() && attempt < max_attempts => {
                warn!(
                    identity = %identity,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Auth services unreachable, retrying"
                );
            }
            Err(e) => return Err(e.into()),
        }

        tokio::select! {
            _ = tokio::time::sleep(policy.retry_interval) => {},
            _ = shutdown.cancelled() => {
                return Err(BootstrapError::Cancelled(identity.to_string()));
            }
        }
        attempt += 1;
    }
}

/// Bootstrap every configured identity concurrently.
///
/// Returns one outcome per identity, sorted by identity.
pub async fn bootstrap_all(
    proxy: Arc<AuthenticationProxy>,
    identities: &[IdentityConfig],
    policy: RetryPolicy,
    shutdown: CancellationToken,
) -> Vec<(String, Result<(), BootstrapError>)> {
    info!(count = identities.len(), "Bootstrapping integration identities");

    let mut tasks = JoinSet::new();
    for config in identities {
        let proxy = Arc::clone(&proxy);
        let shutdown = shutdown.clone();
        let config = config.clone();
        tasks.spawn(async move {
            let outcome = match KeystoreMaterial::from_file(&config.keystore_path, config.password.as_str()) {
                Ok(material) => {
                    bootstrap_identity(&proxy, &config.identity, &material, policy, &shutdown).await
                }
                Err(reason) => Err(BootstrapError::Auth(AuthError::LoadKeystore {
                    identity: config.identity.clone(),
                    reason,
                })),
            };
            (config.identity, outcome)
        });
    }

    let mut outcomes = Vec::with_capacity(identities.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((identity, outcome)) => {
                match &outcome {
                    Ok(()) => info!(identity = %identity, "Identity bootstrapped"),
                    Err(e) => error!(identity = %identity, error = %e, "Identity bootstrap failed"),
                }
                outcomes.push((identity, outcome));
            }
            Err(e) => error!(error = %e, "Bootstrap task panicked"),
        }
    }
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keystore::tests::{plain_material, PLAIN_PEM};
    use crate::auth::proxy::tests::{proxy_with, FakeAuthApi};
    use crate::auth::BackendError;
    use reqwest::StatusCode;
    use std::io::Write;

    fn refused() -> BackendError {
        BackendError::Connectivity("connection refused".to_string())
    }

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            retry_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn retries_connectivity_failures_until_success() {
        let session = Arc::new(FakeAuthApi::new("s").then(Err(refused())).then(Err(refused())));
        let proxy = proxy_with(session.clone(), Arc::new(FakeAuthApi::new("k")));

        bootstrap_identity(&proxy, "jira1", &plain_material(), quick(5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(session.calls(), 3);
        assert!(proxy.is_authenticated("jira1"));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let session = Arc::new(
            FakeAuthApi::new("s")
                .then(Err(refused()))
                .then(Err(refused()))
                .then(Err(refused())),
        );
        let proxy = proxy_with(session.clone(), Arc::new(FakeAuthApi::new("k")));

        let err = bootstrap_identity(&proxy, "jira1", &plain_material(), quick(2), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::Auth(AuthError::PodConnectivity(_))));
        assert_eq!(session.calls(), 2);
    }

    #[tokio::test]
    async fn rejected_certificate_is_not_retried() {
        let session = Arc::new(FakeAuthApi::new("s").then(Err(BackendError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        })));
        let proxy = proxy_with(session.clone(), Arc::new(FakeAuthApi::new("k")));

        let err = bootstrap_identity(&proxy, "jira1", &plain_material(), quick(5), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::Auth(AuthError::UnauthorizedUser { .. })));
        assert_eq!(session.calls(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_retry_loop() {
        let session = Arc::new(FakeAuthApi::new("s").then(Err(refused())));
        let proxy = proxy_with(session.clone(), Arc::new(FakeAuthApi::new("k")));
        let shutdown = CancellationToken::new();
        let policy = RetryPolicy {
            max_attempts: 5,
            retry_interval: Duration::from_secs(60),
        };

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = bootstrap_identity(&proxy, "jira1", &plain_material(), policy, &shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Cancelled(_)));
        assert_eq!(session.calls(), 1);
    }

    #[tokio::test]
    async fn one_identity_failing_does_not_affect_another() {
        let mut keystore = tempfile::NamedTempFile::new().unwrap();
        keystore.write_all(PLAIN_PEM.as_bytes()).unwrap();

        let identities = vec![
            IdentityConfig {
                identity: "jira1".to_string(),
                keystore_path: keystore.path().to_path_buf(),
                password: String::new(),
            },
            IdentityConfig {
                identity: "github1".to_string(),
                keystore_path: "/nonexistent/github1.pem".into(),
                password: String::new(),
            },
        ];
        let proxy = Arc::new(proxy_with(
            Arc::new(FakeAuthApi::new("s")),
            Arc::new(FakeAuthApi::new("k")),
        ));

        let outcomes = bootstrap_all(proxy.clone(), &identities, quick(1), CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "github1");
        assert!(matches!(
            outcomes[0].1,
            Err(BootstrapError::Auth(AuthError::LoadKeystore { .. }))
        ));
        assert_eq!(outcomes[1].0, "jira1");
        assert!(outcomes[1].1.is_ok());
        assert!(proxy.is_authenticated("jira1"));
        assert!(!proxy.is_authenticated("github1"));
    }

    #[tokio::test]
    async fn identity_with_missing_keystore_still_reports_unauthenticated() {
        let identities = vec![IdentityConfig {
            identity: "github1".to_string(),
            keystore_path: "/nonexistent/github1.pem".into(),
            password: String::new(),
        }];
        let proxy = Arc::new(
            proxy_with(Arc::new(FakeAuthApi::new("s")), Arc::new(FakeAuthApi::new("k")))
                .with_expected_identities(identities.iter().map(|c| c.identity.clone())),
        );

        bootstrap_all(proxy.clone(), &identities, quick(1), CancellationToken::new()).await;

        let status = proxy.identities_status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].identity, "github1");
        assert!(!status[0].authenticated);
    }
}
