// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-identity TLS clients.
//!
//! Each registered identity owns exactly one `reqwest::Client` built from its
//! certificate. Clients live for the process lifetime; `reqwest::Client` is
//! internally reference counted, so handing out clones shares one connection
//! pool per identity.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tracing::info;

use super::error::AuthError;
use super::keystore::KeystoreMaterial;

/// Default connect timeout for backend calls.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default overall request timeout for backend calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

/// Default idle connections kept per backend host.
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 20;

/// HTTP settings shared by every identity client.
#[derive(Debug, Clone, Copy)]
pub struct HttpClientSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_idle_per_host: usize,
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
        }
    }
}

impl HttpClientSettings {
    /// Client builder with these timeouts and pool limits applied.
    pub fn client_builder(&self) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
    }
}

/// Identity → TLS client registry.
#[derive(Debug, Default)]
pub struct IdentityStore {
    settings: HttpClientSettings,
    clients: RwLock<HashMap<String, reqwest::Client>>,
}

impl IdentityStore {
    pub fn new(settings: HttpClientSettings) -> Self {
        Self {
            settings,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> HttpClientSettings {
        self.settings
    }

    /// Load the keystore and bind a TLS client to it under `identity`.
    ///
    /// Registering the same identity again replaces its client.
    pub fn register(&self, identity: &str, material: &KeystoreMaterial) -> Result<(), AuthError> {
        let load_error = |reason: String| AuthError::LoadKeystore {
            identity: identity.to_string(),
            reason,
        };

        let tls_identity = material.load().map_err(load_error)?;
        let client = self
            .settings
            .client_builder()
            .identity(tls_identity)
            .build()
            .map_err(|e| load_error(format!("failed to build TLS client: {e}")))?;

        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.to_string(), client);

        info!(identity = %identity, "Registered identity certificate");
        Ok(())
    }

    /// The TLS client bound to `identity`.
    pub fn client_for(&self, identity: &str) -> Result<reqwest::Client, AuthError> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
            .ok_or_else(|| AuthError::UnregisteredIdentity(identity.to_string()))
    }

    pub fn is_registered(&self, identity: &str) -> bool {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identity)
    }

    /// Registered identities, sorted.
    pub fn identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        identities.sort();
        identities
    }
}
