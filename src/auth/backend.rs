// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote authentication services.
//!
//! - Session auth: `POST {base}/session-authenticate` → `{"sessionToken": ..}`
//! - Key manager auth: `POST {base}/key-manager-authenticate` → `{"keyManagerToken": ..}`
//! - App pairing: `POST {base}/app/authenticate` and
//!   `GET {base}/app/authenticate?configurationId=..&appToken=..`
//!
//! The client certificate identifies the caller, so the session and key
//! manager calls carry no body. App pairing calls run over the app
//! identity's client and carry its session token in the `sessionToken`
//! header. Responses are read field-by-field so extra
//! attributes added by the services are ignored.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SESSION_AUTH_PATH: &str = "/session-authenticate";
const KEY_MANAGER_AUTH_PATH: &str = "/key-manager-authenticate";
const APP_AUTH_PATH: &str = "/app/authenticate";
const SESSION_TOKEN_HEADER: &str = "sessionToken";

/// Failure of one remote call, before it is classified by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Connect failure, timeout or broken connection.
    #[error("service unreachable: {0}")]
    Connectivity(String),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The service answered 2xx with an unusable body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            BackendError::Connectivity(e.to_string())
        } else {
            BackendError::InvalidResponse(e.to_string())
        }
    }

    /// Status code for `Status` failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A certificate-authenticated token service.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Obtain a token for `identity` over that identity's TLS client.
    async fn authenticate(&self, client: &Client, identity: &str) -> Result<String, BackendError>;
}

/// `AuthApi` over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    url: String,
    token_field: &'static str,
}

impl HttpAuthApi {
    /// Session authentication service at `base_url`.
    pub fn session(base_url: &str) -> Self {
        Self {
            url: join_url(base_url, SESSION_AUTH_PATH),
            token_field: "sessionToken",
        }
    }

    /// Key manager authentication service at `base_url`.
    pub fn key_manager(base_url: &str) -> Self {
        Self {
            url: join_url(base_url, KEY_MANAGER_AUTH_PATH),
            token_field: "keyManagerToken",
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn authenticate(&self, client: &Client, identity: &str) -> Result<String, BackendError> {
        tracing::debug!(identity = %identity, url = %self.url, "Requesting token");

        let response = client
            .post(&self.url)
            .send()
            .await
            .map_err(BackendError::from_transport)?;

        let body = success_json(response).await?;
        body.get(self.token_field)
            .and_then(Value::as_str)
            .filter(|token| !token.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::InvalidResponse(format!("missing {} in response", self.token_field))
            })
    }
}

/// Token triple issued for one extension-app configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppTokenPair {
    pub configuration_id: String,
    pub app_token: String,
    pub symphony_token: String,
}

/// Backend that issues and stores extension-app token pairs.
///
/// Calls are made on behalf of an integration identity: `client` is its TLS
/// client and `session_token` its current session.
#[async_trait]
pub trait AppPairingApi: Send + Sync {
    /// Exchange `app_token` for a symphony token; the backend stores the triple.
    async fn pair(
        &self,
        client: &Client,
        session_token: &str,
        configuration_id: &str,
        app_token: &str,
    ) -> Result<AppTokenPair, BackendError>;

    /// Stored triple for `(configuration_id, app_token)`, if any.
    async fn find(
        &self,
        client: &Client,
        session_token: &str,
        configuration_id: &str,
        app_token: &str,
    ) -> Result<Option<AppTokenPair>, BackendError>;
}

/// `AppPairingApi` over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpAppPairingApi {
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PairRequest<'a> {
    configuration_id: &'a str,
    app_token: &'a str,
}

impl HttpAppPairingApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: join_url(base_url, APP_AUTH_PATH),
        }
    }
}

#[async_trait]
impl AppPairingApi for HttpAppPairingApi {
    async fn pair(
        &self,
        client: &Client,
        session_token: &str,
        configuration_id: &str,
        app_token: &str,
    ) -> Result<AppTokenPair, BackendError> {
        let response = client
            .post(&self.url)
            .header(SESSION_TOKEN_HEADER, session_token)
            .json(&PairRequest {
                configuration_id,
                app_token,
            })
            .send()
            .await
            .map_err(BackendError::from_transport)?;

        let body = success_json(response).await?;
        let symphony_token = body
            .get("symphonyToken")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::InvalidResponse("missing symphonyToken".to_string()))?;

        Ok(AppTokenPair {
            configuration_id: configuration_id.to_string(),
            app_token: body
                .get("appToken")
                .and_then(Value::as_str)
                .unwrap_or(app_token)
                .to_string(),
            symphony_token: symphony_token.to_string(),
        })
    }

    async fn find(
        &self,
        client: &Client,
        session_token: &str,
        configuration_id: &str,
        app_token: &str,
    ) -> Result<Option<AppTokenPair>, BackendError> {
        let response = client
            .get(&self.url)
            .header(SESSION_TOKEN_HEADER, session_token)
            .query(&[("configurationId", configuration_id), ("appToken", app_token)])
            .send()
            .await
            .map_err(BackendError::from_transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = success_json(response).await?;
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| BackendError::InvalidResponse(format!("invalid token pair: {e}")))
    }
}

async fn success_json(response: reqwest::Response) -> Result<Value, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status { status, body });
    }

    response
        .json()
        .await
        .map_err(|e| BackendError::InvalidResponse(format!("invalid JSON: {e}")))
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn session_token_is_read_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session-authenticate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "name": "sessionToken", "sessionToken": "480d9f271e54d02ea8351" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpAuthApi::session(&format!("{}/", server.uri()));
        let token = api.authenticate(&Client::new(), "jira1").await.unwrap();
        assert_eq!(token, "480d9f271e54d02ea8351");
    }

    #[tokio::test]
    async fn key_manager_token_is_read_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/key-manager-authenticate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "keyManagerToken": "0100e4c5" })),
            )
            .mount(&server)
            .await;

        let api = HttpAuthApi::key_manager(&server.uri());
        assert_eq!(api.authenticate(&Client::new(), "jira1").await.unwrap(), "0100e4c5");
    }

    #[tokio::test]
    async fn unauthorized_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad cert"))
            .mount(&server)
            .await;

        let api = HttpAuthApi::session(&server.uri());
        let err = api.authenticate(&Client::new(), "jira1").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn missing_token_field_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "x" })))
            .mount(&server)
            .await;

        let api = HttpAuthApi::session(&server.uri());
        let err = api.authenticate(&Client::new(), "jira1").await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn timeout_is_connectivity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "sessionToken": "late" }))
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(50))
            .build()
            .unwrap();
        let api = HttpAuthApi::session(&server.uri());
        let err = api.authenticate(&client, "jira1").await.unwrap_err();
        assert!(matches!(err, BackendError::Connectivity(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_connectivity() {
        // Bind then drop a listener to get a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let api = HttpAuthApi::session(&format!("http://127.0.0.1:{port}"));
        let err = api.authenticate(&Client::new(), "jira1").await.unwrap_err();
        assert!(matches!(err, BackendError::Connectivity(_)));
    }

    #[tokio::test]
    async fn pair_posts_configuration_and_app_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/authenticate"))
            .and(header("sessionToken", "s-1"))
            .and(body_json(json!({ "configurationId": "cfg-1", "appToken": "ta" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "configurationId": "cfg-1",
                "appToken": "ta",
                "symphonyToken": "ts"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpAppPairingApi::new(&server.uri());
        let pair = api.pair(&Client::new(), "s-1", "cfg-1", "ta").await.unwrap();
        assert_eq!(
            pair,
            AppTokenPair {
                configuration_id: "cfg-1".to_string(),
                app_token: "ta".to_string(),
                symphony_token: "ts".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn find_returns_stored_pair() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app/authenticate"))
            .and(query_param("configurationId", "cfg-1"))
            .and(query_param("appToken", "ta"))
            .and(header("sessionToken", "s-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "configurationId": "cfg-1",
                "appToken": "ta",
                "symphonyToken": "ts"
            })))
            .mount(&server)
            .await;

        let api = HttpAppPairingApi::new(&server.uri());
        let pair = api.find(&Client::new(), "s-1", "cfg-1", "ta").await.unwrap().unwrap();
        assert_eq!(pair.symphony_token, "ts");
    }

    #[tokio::test]
    async fn find_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = HttpAppPairingApi::new(&server.uri());
        assert!(api
            .find(&Client::new(), "s-1", "cfg-1", "unknown")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn pairing_rejection_keeps_status_for_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/authenticate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let api = HttpAppPairingApi::new(&server.uri());
        let err = api
            .pair(&Client::new(), "stale", "cfg-1", "ta")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }
}
