// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Certificate-based session authentication for many integration identities,
//! plus token pairing for extension applications.
//!
//! ## Auth Flow
//!
//! 1. Bootstrap registers each identity with its keystore
//!    ([`AuthenticationProxy::register`]), building one TLS client per
//!    identity.
//! 2. [`AuthenticationProxy::authenticate`] calls the session-auth service and
//!    then the key-manager-auth service over that client and caches the
//!    token pair.
//! 3. Outbound callers fetch the session token or TLS client; on a 401 they
//!    call [`AuthenticationProxy::re_auth_or_throw`] and retry once.
//!
//! Extension apps use [`AppAuthenticationProxy`]: an application token is
//! exchanged for a symphony token, and later requests are validated by
//! matching the pair against the backend record.
//!
//! ## Security
//!
//! - Token values, passwords and key bytes never reach logs or `Debug` output
//! - Backend calls use bounded connect/request timeouts
//! - A timeout is a connectivity failure, never an authorization failure

pub mod app;
pub mod backend;
pub mod cache;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod proxy;
pub mod token;

pub use app::{AppAuthenticationProxy, AppTokenPair};
pub use backend::{AppPairingApi, AuthApi, BackendError, HttpAppPairingApi, HttpAuthApi};
pub use cache::TokenCache;
pub use error::{AppAuthError, AuthError, ReAuthError};
pub use identity::{HttpClientSettings, IdentityStore};
pub use keystore::{KeystoreFormat, KeystoreMaterial};
pub use proxy::{AuthenticationProxy, IdentityStatus, SessionStatus};
pub use token::AuthenticationToken;
