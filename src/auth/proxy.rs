// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Coordinator
//!
//! Authenticates many integration identities concurrently against the
//! session-auth and key-manager-auth services and hands out their tokens and
//! TLS clients.
//!
//! ## Token State
//!
//! ```text
//! VOID --authenticate ok--> ACTIVE --invalidate / 401--> VOID --> ...
//! ```
//!
//! Transitions only happen on explicit calls; nothing expires in the
//! background.
//!
//! ## Refresh Policy
//!
//! Callers that receive a 401 call [`AuthenticationProxy::re_auth_or_throw`],
//! which invalidates and re-authenticates exactly once and never retries the
//! caller's request. Any other status hands the caller's error straight back.
//!
//! Authentications of the same identity are serialized by a per-identity
//! guard; different identities never wait on each other.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::backend::{AuthApi, BackendError};
use super::cache::TokenCache;
use super::error::{AuthError, ReAuthError};
use super::identity::IdentityStore;
use super::keystore::KeystoreMaterial;
use super::token::AuthenticationToken;

/// Which backend a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthService {
    Session,
    KeyManager,
}

/// Meaning of a status code returned by a backend call made with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Credentials are stale; refreshing is safe.
    Unauthorized,
    /// Credentials are valid but access was revoked; do not refresh.
    NoLongerEntitled,
    Other,
}

/// Health snapshot of one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityStatus {
    pub identity: String,
    pub authenticated: bool,
}

/// Coordinator over the identity store, the token cache and the two
/// authentication services.
pub struct AuthenticationProxy {
    identities: IdentityStore,
    tokens: TokenCache,
    session_api: Arc<dyn AuthApi>,
    key_manager_api: Arc<dyn AuthApi>,
    guards: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    reauth_grace: Duration,
    expected: Vec<String>,
}

impl AuthenticationProxy {
    /// Create a ready-to-use coordinator.
    pub fn new(
        identities: IdentityStore,
        session_api: Arc<dyn AuthApi>,
        key_manager_api: Arc<dyn AuthApi>,
    ) -> Self {
        Self {
            identities,
            tokens: TokenCache::new(),
            session_api,
            key_manager_api,
            guards: RwLock::new(HashMap::new()),
            reauth_grace: Duration::ZERO,
            expected: Vec::new(),
        }
    }

    /// Identities that must show up in [`identities_status`](Self::identities_status)
    /// even before (or if never) registered.
    pub fn with_expected_identities<I, S>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected = identities.into_iter().map(Into::into).collect();
        self
    }

    /// Skip 401-triggered refreshes while the cached token is younger than
    /// `grace`. Zero (the default) always refreshes.
    pub fn with_reauth_grace(mut self, grace: Duration) -> Self {
        self.reauth_grace = grace;
        self
    }

    /// Register an identity and its certificate.
    pub fn register(&self, identity: &str, material: &KeystoreMaterial) -> Result<(), AuthError> {
        self.identities.register(identity, material)?;
        self.guards
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(identity.to_string())
            .or_default();
        Ok(())
    }

    fn guard(&self, identity: &str) -> Result<Arc<Mutex<()>>, AuthError> {
        self.guards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
            .ok_or_else(|| AuthError::UnregisteredIdentity(identity.to_string()))
    }

    /// Authenticate `identity` against both services and cache the result.
    ///
    /// On failure the cached token (if any) is left untouched.
    pub async fn authenticate(&self, identity: &str) -> Result<(), AuthError> {
        let guard = self.guard(identity)?;
        let _in_flight = guard.lock().await;
        self.authenticate_locked(identity).await
    }

    async fn authenticate_locked(&self, identity: &str) -> Result<(), AuthError> {
        let client = self.identities.client_for(identity)?;

        info!(identity = %identity, "Authenticating identity");

        let session_token = self
            .session_api
            .authenticate(&client, identity)
            .await
            .map_err(|e| classify_backend_error(AuthService::Session, identity, e))?;

        let key_manager_token = self
            .key_manager_api
            .authenticate(&client, identity)
            .await
            .map_err(|e| classify_backend_error(AuthService::KeyManager, identity, e))?;

        self.tokens.put(
            identity,
            AuthenticationToken::new(session_token, key_manager_token),
        );

        info!(identity = %identity, "Identity authenticated");
        Ok(())
    }

    /// Whether `identity` currently holds a non-void token.
    pub fn is_authenticated(&self, identity: &str) -> bool {
        !self.tokens.get(identity).is_void()
    }

    /// Current token pair of `identity`.
    pub fn get_token(&self, identity: &str) -> Result<AuthenticationToken, AuthError> {
        let token = self.tokens.get(identity);
        if token.is_void() {
            return Err(AuthError::UnregisteredUserAuth(identity.to_string()));
        }
        Ok(token)
    }

    /// Current session token of `identity`.
    pub fn get_session_token(&self, identity: &str) -> Result<String, AuthError> {
        let token = self.tokens.get(identity);
        if token.is_void() {
            return Err(AuthError::UnregisteredSessionToken);
        }
        Ok(token.session_token().to_string())
    }

    /// Void the cached token. Does not re-authenticate.
    pub fn invalidate(&self, identity: &str) {
        self.tokens.invalidate(identity);
        info!(identity = %identity, "Invalidated session");
    }

    /// Refresh the session of `identity` if `status` says it is stale,
    /// otherwise hand `err` back unchanged.
    ///
    /// On `Ok(())` the caller retries its own request with the refreshed
    /// token. At most one re-authentication happens per call.
    pub async fn re_auth_or_throw<E>(
        &self,
        identity: &str,
        status: StatusCode,
        err: E,
    ) -> Result<(), ReAuthError<E>> {
        if !Self::session_unauthorized(status) {
            return Err(ReAuthError::Original(err));
        }

        let guard = self.guard(identity).map_err(ReAuthError::Auth)?;
        let _in_flight = guard.lock().await;
        self.refresh_locked(identity, status)
            .await
            .map_err(ReAuthError::Auth)
    }

    /// Invalidate and re-authenticate unless the token is inside the grace
    /// window. Caller holds the identity guard.
    async fn refresh_locked(&self, identity: &str, status: StatusCode) -> Result<(), AuthError> {
        if let Some(age) = self.tokens.get(identity).age() {
            if age < self.reauth_grace {
                debug!(
                    identity = %identity,
                    age_ms = age.as_millis() as u64,
                    "Session refreshed recently, skipping re-authentication"
                );
                return Ok(());
            }
        }

        warn!(identity = %identity, %status, "Session unauthorized, re-authenticating");
        self.invalidate(identity);
        self.authenticate_locked(identity).await
    }

    /// [`re_auth_or_throw`](Self::re_auth_or_throw) for a caller that only
    /// holds a session token. Returns the (possibly refreshed) token pair.
    ///
    /// The token may be the one the identity just retired: when another
    /// caller already refreshed it, the current pair is returned without a
    /// second authentication.
    pub async fn re_auth_session_or_throw<E>(
        &self,
        session_token: &str,
        status: StatusCode,
        err: E,
    ) -> Result<AuthenticationToken, ReAuthError<E>> {
        let identity = self
            .tokens
            .identity_for_recent_session(session_token)
            .ok_or(ReAuthError::Auth(AuthError::UnregisteredSessionToken))?;

        if !Self::session_unauthorized(status) {
            return Err(ReAuthError::Original(err));
        }

        let guard = self.guard(&identity).map_err(ReAuthError::Auth)?;
        let _in_flight = guard.lock().await;

        let current = self.tokens.get(&identity);
        if !current.is_void() && current.session_token() != session_token {
            debug!(identity = %identity, "Session already refreshed by another caller");
            return Ok(current);
        }

        self.refresh_locked(&identity, status)
            .await
            .map_err(ReAuthError::Auth)?;
        self.get_token(&identity).map_err(ReAuthError::Auth)
    }

    /// Classify a backend status code.
    pub fn classify_status(status: StatusCode) -> SessionStatus {
        match status {
            StatusCode::UNAUTHORIZED => SessionStatus::Unauthorized,
            StatusCode::FORBIDDEN => SessionStatus::NoLongerEntitled,
            _ => SessionStatus::Other,
        }
    }

    /// Stale credentials: safe to refresh.
    pub fn session_unauthorized(status: StatusCode) -> bool {
        Self::classify_status(status) == SessionStatus::Unauthorized
    }

    /// Access revoked: surface to the caller, never refresh.
    pub fn session_no_longer_entitled(status: StatusCode) -> bool {
        Self::classify_status(status) == SessionStatus::NoLongerEntitled
    }

    /// TLS client bound to `identity`.
    pub fn http_client_for_identity(&self, identity: &str) -> Result<Client, AuthError> {
        self.identities.client_for(identity)
    }

    /// TLS client of the identity that currently holds `session_token`.
    pub fn http_client_for_session_token(&self, session_token: &str) -> Result<Client, AuthError> {
        let identity = self
            .tokens
            .identity_for_session(session_token)
            .ok_or(AuthError::UnregisteredSessionToken)?;
        self.identities.client_for(&identity)
    }

    /// Registered and expected identities with their authentication state,
    /// sorted. An expected identity that never registered is unauthenticated.
    pub fn identities_status(&self) -> Vec<IdentityStatus> {
        let names: BTreeSet<String> = self
            .identities
            .identities()
            .into_iter()
            .chain(self.expected.iter().cloned())
            .collect();
        names
            .into_iter()
            .map(|identity| IdentityStatus {
                authenticated: self.is_authenticated(&identity),
                identity,
            })
            .collect()
    }
}

impl std::fmt::Debug for AuthenticationProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationProxy")
            .field("identities", &self.identities.identities())
            .field("reauth_grace", &self.reauth_grace)
            .finish_non_exhaustive()
    }
}

fn classify_backend_error(service: AuthService, identity: &str, e: BackendError) -> AuthError {
    match e {
        BackendError::Connectivity(reason) => match service {
            AuthService::Session => AuthError::PodConnectivity(reason),
            AuthService::KeyManager => AuthError::KeyManagerConnectivity(reason),
        },
        BackendError::Status { status, body } => match AuthenticationProxy::classify_status(status) {
            SessionStatus::Unauthorized => AuthError::UnauthorizedUser {
                identity: identity.to_string(),
            },
            SessionStatus::NoLongerEntitled => AuthError::ForbiddenAuth {
                identity: identity.to_string(),
            },
            SessionStatus::Other => AuthError::UnexpectedAuth {
                identity: identity.to_string(),
                reason: format!("{service:?} service returned {status}: {body}"),
            },
        },
        BackendError::InvalidResponse(reason) => AuthError::UnexpectedAuth {
            identity: identity.to_string(),
            reason: format!("{service:?} service: {reason}"),
        },
    }
}
