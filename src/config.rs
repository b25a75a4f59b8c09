// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SESSION_AUTH_URL` | Session authentication service base URL | Required |
//! | `KEY_MANAGER_AUTH_URL` | Key manager authentication service base URL | Required |
//! | `APP_PAIRING_URL` | Extension-app pairing service base URL | Required |
//! | `APP_IDENTITY` | Identity whose session and certificate pairing calls use | First of `INTEGRATION_IDENTITIES` |
//! | `INTEGRATION_IDENTITIES` | Comma-separated identities to bootstrap | Empty |
//! | `CERTS_DIR` | Directory holding `<identity>.pem` keystores | `/certs` |
//! | `<IDENTITY>_KEYSTORE_FILE` | Keystore path override for one identity | `CERTS_DIR/<identity>.pem` |
//! | `<IDENTITY>_KEYSTORE_PASSWORD` | Keystore password for one identity | Empty |
//! | `AUTH_CONNECT_TIMEOUT_MS` | Backend connect timeout | `2000` |
//! | `AUTH_REQUEST_TIMEOUT_MS` | Backend request timeout | `4000` |
//! | `REAUTH_GRACE_SECS` | Skip 401 refreshes for tokens younger than this | `0` |
//! | `BOOTSTRAP_MAX_ATTEMPTS` | Authentication attempts per identity at startup | `5` |
//! | `BOOTSTRAP_RETRY_SECS` | Delay between startup attempts | `5` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | Serve HTTPS with this PEM pair | Plain HTTP |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! `<IDENTITY>` is the identity upper-cased with every non-alphanumeric
//! character replaced by `_` (`jira-1` → `JIRA_1`).

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::auth::HttpClientSettings;
use crate::bootstrap::RetryPolicy;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const SESSION_AUTH_URL_ENV: &str = "SESSION_AUTH_URL";
pub const KEY_MANAGER_AUTH_URL_ENV: &str = "KEY_MANAGER_AUTH_URL";
pub const APP_PAIRING_URL_ENV: &str = "APP_PAIRING_URL";
pub const APP_IDENTITY_ENV: &str = "APP_IDENTITY";
pub const INTEGRATION_IDENTITIES_ENV: &str = "INTEGRATION_IDENTITIES";
pub const CERTS_DIR_ENV: &str = "CERTS_DIR";
pub const CONNECT_TIMEOUT_ENV: &str = "AUTH_CONNECT_TIMEOUT_MS";
pub const REQUEST_TIMEOUT_ENV: &str = "AUTH_REQUEST_TIMEOUT_MS";
pub const REAUTH_GRACE_ENV: &str = "REAUTH_GRACE_SECS";
pub const BOOTSTRAP_MAX_ATTEMPTS_ENV: &str = "BOOTSTRAP_MAX_ATTEMPTS";
pub const BOOTSTRAP_RETRY_ENV: &str = "BOOTSTRAP_RETRY_SECS";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CERTS_DIR: &str = "/certs";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration found for {0}; set it to the service base URL")]
    MissingUrl(&'static str),

    #[error("{key} is not a valid http(s) URL: {reason}")]
    InvalidUrl { key: &'static str, reason: String },

    #[error("{key} must be a non-negative integer in range, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("APP_IDENTITY {0} is not listed in INTEGRATION_IDENTITIES")]
    UnknownAppIdentity(String),
}

/// Keystore location and password for one identity.
#[derive(Clone)]
pub struct IdentityConfig {
    pub identity: String,
    pub keystore_path: PathBuf,
    pub password: String,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("identity", &self.identity)
            .field("keystore_path", &self.keystore_path)
            .finish_non_exhaustive()
    }
}

/// Server TLS material.
#[derive(Debug, Clone)]
pub struct ServerTls {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Fully validated runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub session_auth_url: Url,
    pub key_manager_auth_url: Url,
    pub app_pairing_url: Url,
    /// Identity pairing calls run as; `None` only when no identity is configured.
    pub app_identity: Option<String>,
    pub identities: Vec<IdentityConfig>,
    pub http: HttpClientSettings,
    pub reauth_grace: Duration,
    pub bootstrap: RetryPolicy,
    pub tls: Option<ServerTls>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through `lookup` (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let session_auth_url = env.url(SESSION_AUTH_URL_ENV)?;
        let key_manager_auth_url = env.url(KEY_MANAGER_AUTH_URL_ENV)?;
        let app_pairing_url = env.url(APP_PAIRING_URL_ENV)?;

        let certs_dir = PathBuf::from(env.or_default(CERTS_DIR_ENV, DEFAULT_CERTS_DIR));
        let identities: Vec<IdentityConfig> = env
            .optional(INTEGRATION_IDENTITIES_ENV)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|identity| !identity.is_empty())
                    .map(|identity| IdentityConfig {
                        identity: identity.to_string(),
                        keystore_path: env
                            .optional(&identity_key(identity, "KEYSTORE_FILE"))
                            .map(PathBuf::from)
                            .unwrap_or_else(|| certs_dir.join(format!("{identity}.pem"))),
                        password: (env.lookup)(&identity_key(identity, "KEYSTORE_PASSWORD"))
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let app_identity = match env.optional(APP_IDENTITY_ENV) {
            Some(app_identity) if identities.iter().any(|c| c.identity == app_identity) => {
                Some(app_identity)
            }
            Some(app_identity) => return Err(ConfigError::UnknownAppIdentity(app_identity)),
            None => identities.first().map(|c| c.identity.clone()),
        };

        let defaults = HttpClientSettings::default();
        let http = HttpClientSettings {
            connect_timeout: env
                .number(CONNECT_TIMEOUT_ENV)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            request_timeout: env
                .number(REQUEST_TIMEOUT_ENV)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            ..defaults
        };

        let retry_defaults = RetryPolicy::default();
        let bootstrap = RetryPolicy {
            max_attempts: env
                .bounded::<u32>(BOOTSTRAP_MAX_ATTEMPTS_ENV)?
                .map(|n| n.max(1))
                .unwrap_or(retry_defaults.max_attempts),
            retry_interval: env
                .number(BOOTSTRAP_RETRY_ENV)?
                .map(Duration::from_secs)
                .unwrap_or(retry_defaults.retry_interval),
        };

        let tls = match (env.optional(TLS_CERT_PATH_ENV), env.optional(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(ServerTls {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            _ => None,
        };

        Ok(Self {
            host: env.or_default(HOST_ENV, DEFAULT_HOST),
            port: env.bounded(PORT_ENV)?.unwrap_or(DEFAULT_PORT),
            session_auth_url,
            key_manager_auth_url,
            app_pairing_url,
            app_identity,
            identities,
            http,
            reauth_grace: Duration::from_secs(env.number(REAUTH_GRACE_ENV)?.unwrap_or(0)),
            bootstrap,
            tls,
        })
    }
}

/// `jira-1` + `KEYSTORE_PASSWORD` → `JIRA_1_KEYSTORE_PASSWORD`.
pub fn identity_key(identity: &str, suffix: &str) -> String {
    let prefix: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{prefix}_{suffix}")
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn number(&self, name: &str) -> Result<Option<u64>, ConfigError> {
        self.optional(name)
            .map(|value| {
                value.parse().map_err(|_| ConfigError::InvalidNumber {
                    key: name.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn bounded<T: TryFrom<u64>>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        let Some(n) = self.number(name)? else {
            return Ok(None);
        };
        T::try_from(n)
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: name.to_string(),
                value: n.to_string(),
            })
    }

    fn url(&self, key: &'static str) -> Result<Url, ConfigError> {
        let raw = self.optional(key).ok_or(ConfigError::MissingUrl(key))?;
        let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
            key,
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                key,
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(url)
    }
}
