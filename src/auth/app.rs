// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Extension application token pairing.
//!
//! ## Flow
//!
//! 1. The integration generates an application token (Ta) per configuration.
//! 2. The pairing backend exchanges it for a symphony token (Ts) and stores
//!    the `(configurationId, Ta, Ts)` triple.
//! 3. The client app later presents `(configurationId, Ta, Ts)`; it is valid
//!    iff the backend's stored Ts for `(configurationId, Ta)` matches.
//!
//! Pairing calls are made as the app identity, over its TLS client and with
//! its current session token. A 401 from the pairing backend refreshes that
//! session once and repeats the call. No pairing state is kept locally.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use reqwest::{Client, StatusCode};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{info, warn};

use super::backend::{AppPairingApi, BackendError};
use super::error::{AppAuthError, ReAuthError};
use super::proxy::AuthenticationProxy;

pub use super::backend::AppTokenPair;

/// Random bytes behind one application token.
const APP_TOKEN_BYTES: usize = 32;

/// Stateless extension-app authentication.
#[derive(Clone)]
pub struct AppAuthenticationProxy {
    auth: Arc<AuthenticationProxy>,
    app_identity: String,
    pairing: Arc<dyn AppPairingApi>,
    rng: SystemRandom,
}

impl AppAuthenticationProxy {
    /// Pair tokens as `app_identity`, an identity managed by `auth`.
    pub fn new(
        auth: Arc<AuthenticationProxy>,
        app_identity: impl Into<String>,
        pairing: Arc<dyn AppPairingApi>,
    ) -> Self {
        Self {
            auth,
            app_identity: app_identity.into(),
            pairing,
            rng: SystemRandom::new(),
        }
    }

    pub fn app_identity(&self) -> &str {
        &self.app_identity
    }

    /// Start pairing for `configuration_id`; returns the new application
    /// token the client app must echo back.
    pub async fn authenticate(&self, configuration_id: &str) -> Result<String, AppAuthError> {
        let app_token = self.generate_token(configuration_id)?;

        let (client, session_token) = self.session()?;
        let paired = match self
            .pairing
            .pair(&client, &session_token, configuration_id, &app_token)
            .await
        {
            Err(e) if e.status() == Some(StatusCode::UNAUTHORIZED) => {
                let (client, session_token) =
                    self.refresh_session(&session_token, configuration_id, e).await?;
                self.pairing
                    .pair(&client, &session_token, configuration_id, &app_token)
                    .await
            }
            other => other,
        };
        let pair = paired.map_err(|e| classify_pairing_error(configuration_id, e))?;

        if pair.app_token != app_token || pair.symphony_token.trim().is_empty() {
            return Err(AppAuthError::UnexpectedAppAuthentication {
                configuration_id: configuration_id.to_string(),
                reason: "pairing response does not match the issued application token".to_string(),
            });
        }

        info!(configuration_id = %configuration_id, "Application token pair issued");
        Ok(app_token)
    }

    /// Whether `(app_token, symphony_token)` is the pair issued for
    /// `configuration_id`. A mismatch is `Ok(false)`, not an error.
    pub async fn is_valid_token_pair(
        &self,
        configuration_id: &str,
        app_token: &str,
        symphony_token: &str,
    ) -> Result<bool, AppAuthError> {
        if configuration_id.is_empty() || app_token.is_empty() || symphony_token.is_empty() {
            return Ok(false);
        }

        let (client, session_token) = self.session()?;
        let found = match self
            .pairing
            .find(&client, &session_token, configuration_id, app_token)
            .await
        {
            Err(e) if e.status() == Some(StatusCode::UNAUTHORIZED) => {
                let (client, session_token) =
                    self.refresh_session(&session_token, configuration_id, e).await?;
                self.pairing
                    .find(&client, &session_token, configuration_id, app_token)
                    .await
            }
            other => other,
        };
        let stored = found.map_err(|e| classify_pairing_error(configuration_id, e))?;

        let valid = stored.is_some_and(|pair| {
            pair.configuration_id == configuration_id
                && pair.app_token == app_token
                && pair.symphony_token == symphony_token
        });

        if !valid {
            warn!(configuration_id = %configuration_id, "Application token pair rejected");
        }
        Ok(valid)
    }

    fn session(&self) -> Result<(Client, String), AppAuthError> {
        let client = self.auth.http_client_for_identity(&self.app_identity)?;
        let session_token = self.auth.get_session_token(&self.app_identity)?;
        Ok((client, session_token))
    }

    async fn refresh_session(
        &self,
        session_token: &str,
        configuration_id: &str,
        rejected: BackendError,
    ) -> Result<(Client, String), AppAuthError> {
        warn!(
            identity = %self.app_identity,
            configuration_id = %configuration_id,
            "Pairing backend rejected the app identity session"
        );
        let token = self
            .auth
            .re_auth_session_or_throw(session_token, StatusCode::UNAUTHORIZED, rejected)
            .await
            .map_err(|e| match e {
                ReAuthError::Original(e) => classify_pairing_error(configuration_id, e),
                ReAuthError::Auth(e) => AppAuthError::Session(e),
            })?;
        let client = self.auth.http_client_for_identity(&self.app_identity)?;
        Ok((client, token.session_token().to_string()))
    }

    fn generate_token(&self, configuration_id: &str) -> Result<String, AppAuthError> {
        let mut bytes = [0u8; APP_TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppAuthError::UnexpectedAppAuthentication {
                configuration_id: configuration_id.to_string(),
                reason: "system random generator unavailable".to_string(),
            })?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }
}

impl std::fmt::Debug for AppAuthenticationProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppAuthenticationProxy")
            .field("app_identity", &self.app_identity)
            .finish_non_exhaustive()
    }
}

fn classify_pairing_error(configuration_id: &str, e: BackendError) -> AppAuthError {
    let configuration_id = configuration_id.to_string();
    match e {
        BackendError::Connectivity(reason) => AppAuthError::Connectivity(reason),
        BackendError::Status { status, .. } if status == StatusCode::UNAUTHORIZED => {
            AppAuthError::UnauthorizedApp { configuration_id }
        }
        BackendError::Status { status, .. } if status == StatusCode::BAD_REQUEST => {
            AppAuthError::InvalidAppToken { configuration_id }
        }
        BackendError::Status { status, body } => AppAuthError::UnexpectedAppAuthentication {
            configuration_id,
            reason: format!("pairing service returned {status}: {body}"),
        },
        BackendError::InvalidResponse(reason) => AppAuthError::UnexpectedAppAuthentication {
            configuration_id,
            reason,
        },
    }
}
