// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every failure is typed so callers can branch on the kind without reading
//! messages:
//!
//! | Kind | Variants | Retried here? |
//! |------|----------|---------------|
//! | Connectivity | `PodConnectivity`, `KeyManagerConnectivity` | no (bootstrap retries) |
//! | Unauthorized | `UnauthorizedUser` | once, via `re_auth_or_throw` |
//! | Forbidden | `ForbiddenAuth` | never |
//! | Unregistered | `UnregisteredIdentity`, `UnregisteredUserAuth`, `UnregisteredSessionToken` | never |
//! | Keystore | `LoadKeystore` | never |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errors raised by the identity store and the authentication coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The keystore of an identity could not be read, parsed or decrypted.
    #[error("Failed to load keystore for {identity}: {reason}")]
    LoadKeystore { identity: String, reason: String },

    /// The identity was never registered with the identity store.
    #[error("Identity {0} is not registered")]
    UnregisteredIdentity(String),

    /// No authentication token is cached for the identity.
    #[error("Identity {0} has no authentication token; authenticate it first")]
    UnregisteredUserAuth(String),

    /// No session token is cached, or the session token is unknown.
    #[error("Session token is not registered")]
    UnregisteredSessionToken,

    /// The POD session service could not be reached.
    #[error("POD session service is unreachable: {0}")]
    PodConnectivity(String),

    /// The key manager service could not be reached.
    #[error("Key manager service is unreachable: {0}")]
    KeyManagerConnectivity(String),

    /// The backend rejected the certificate credentials.
    #[error("Certificate authentication is unauthorized for identity {identity}")]
    UnauthorizedUser { identity: String },

    /// The credentials are valid but the identity is no longer entitled.
    #[error("Certificate authentication is forbidden for identity {identity}")]
    ForbiddenAuth { identity: String },

    /// Any other backend answer.
    #[error("Failed to process certificate login for identity {identity}: {reason}")]
    UnexpectedAuth { identity: String, reason: String },
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::LoadKeystore { .. } => "load_keystore",
            AuthError::UnregisteredIdentity(_) => "unregistered_identity",
            AuthError::UnregisteredUserAuth(_) => "unregistered_user_auth",
            AuthError::UnregisteredSessionToken => "unregistered_session_token",
            AuthError::PodConnectivity(_) => "pod_connectivity",
            AuthError::KeyManagerConnectivity(_) => "key_manager_connectivity",
            AuthError::UnauthorizedUser { .. } => "unauthorized_user",
            AuthError::ForbiddenAuth { .. } => "forbidden",
            AuthError::UnexpectedAuth { .. } => "unexpected_auth",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::UnauthorizedUser { .. } => StatusCode::UNAUTHORIZED,
            AuthError::ForbiddenAuth { .. } => StatusCode::FORBIDDEN,
            AuthError::PodConnectivity(_) | AuthError::KeyManagerConnectivity(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AuthError::UnexpectedAuth { .. } => StatusCode::BAD_GATEWAY,
            AuthError::LoadKeystore { .. }
            | AuthError::UnregisteredIdentity(_)
            | AuthError::UnregisteredUserAuth(_)
            | AuthError::UnregisteredSessionToken => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure is a connectivity failure (safe to retry later).
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            AuthError::PodConnectivity(_) | AuthError::KeyManagerConnectivity(_)
        )
    }
}

/// Outcome of a failed `re_auth_or_throw`.
///
/// `Original` carries the caller's error untouched; `Auth` means the
/// refresh itself failed.
#[derive(Debug, thiserror::Error)]
pub enum ReAuthError<E> {
    #[error(transparent)]
    Original(E),

    #[error(transparent)]
    Auth(AuthError),
}

impl<E> ReAuthError<E> {
    /// The original error, if this is a pass-through.
    pub fn into_original(self) -> Option<E> {
        match self {
            ReAuthError::Original(e) => Some(e),
            ReAuthError::Auth(_) => None,
        }
    }
}

/// Errors raised by the extension-app pairing protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppAuthError {
    /// The backend does not accept this application.
    #[error("Application is unauthorized to pair tokens for configuration {configuration_id}")]
    UnauthorizedApp { configuration_id: String },

    /// The backend rejected the request as malformed.
    #[error("Invalid application token for configuration {configuration_id}")]
    InvalidAppToken { configuration_id: String },

    /// Any other backend answer.
    #[error("Unexpected application authentication failure for configuration {configuration_id}: {reason}")]
    UnexpectedAppAuthentication {
        configuration_id: String,
        reason: String,
    },

    /// The pairing service could not be reached.
    #[error("App pairing service is unreachable: {0}")]
    Connectivity(String),

    /// The app identity has no usable session to pair with.
    #[error(transparent)]
    Session(#[from] AuthError),
}

impl AppAuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppAuthError::UnauthorizedApp { .. } => "unauthorized_app",
            AppAuthError::InvalidAppToken { .. } => "invalid_app_token",
            AppAuthError::UnexpectedAppAuthentication { .. } => "unexpected_app_authentication",
            AppAuthError::Connectivity(_) => "app_pairing_connectivity",
            AppAuthError::Session(e) => e.error_code(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppAuthError::UnauthorizedApp { .. } => StatusCode::UNAUTHORIZED,
            AppAuthError::InvalidAppToken { .. } => StatusCode::BAD_REQUEST,
            AppAuthError::UnexpectedAppAuthentication { .. } => StatusCode::BAD_GATEWAY,
            AppAuthError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppAuthError::Session(e) => e.status_code(),
        }
    }
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

impl IntoResponse for AppAuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
