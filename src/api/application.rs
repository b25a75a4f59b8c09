// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::{
    error::ApiError,
    models::{AppAuthenticateResponse, TokenPairResponse, ValidateTokensRequest},
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/v1/application/{configuration_id}/jwt/authenticate",
    params(
        ("configuration_id" = String, Path, description = "Extension app configuration")
    ),
    tag = "Application",
    responses(
        (status = 200, body = AppAuthenticateResponse),
        (status = 401, description = "Application is not authorized to pair"),
        (status = 503, description = "Pairing service unreachable")
    )
)]
pub async fn authenticate(
    Path(configuration_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AppAuthenticateResponse>, ApiError> {
    let app_token = state.app_auth.authenticate(&configuration_id).await?;
    Ok(Json(AppAuthenticateResponse {
        configuration_id,
        app_token,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/application/{configuration_id}/jwt/tokens/validate",
    params(
        ("configuration_id" = String, Path, description = "Extension app configuration")
    ),
    request_body = ValidateTokensRequest,
    tag = "Application",
    responses(
        (status = 200, body = TokenPairResponse),
        (status = 400, description = "A token is missing"),
        (status = 401, description = "Token pair does not match")
    )
)]
pub async fn validate_tokens(
    Path(configuration_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ValidateTokensRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let app_token = required(request.application_token, "applicationToken")?;
    let symphony_token = required(request.symphony_token, "symphonyToken")?;

    let valid = state
        .app_auth
        .is_valid_token_pair(&configuration_id, &app_token, &symphony_token)
        .await?;
    if !valid {
        return Err(ApiError::unauthorized("Invalid application token pair"));
    }

    info!(configuration_id = %configuration_id, "Application token pair validated");
    Ok(Json(TokenPairResponse {
        configuration_id,
        app_token,
        symphony_token,
    }))
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::router;
    use crate::auth::app::tests::{authenticated_auth, FakePairingApi, APP_IDENTITY};
    use crate::auth::{AppAuthenticationProxy, BackendError};
    use crate::state::AppState;

    async fn state_with(pairing: Arc<FakePairingApi>) -> AppState {
        let (auth, _) = authenticated_auth().await;
        let app_auth = AppAuthenticationProxy::new(Arc::clone(&auth), APP_IDENTITY, pairing);
        AppState::new(auth, app_auth)
    }

    async fn post(state: AppState, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = router(state)
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn authenticate_then_validate_round_trip() {
        let pairing = Arc::new(FakePairingApi::default());
        let state = state_with(pairing.clone()).await;

        let (status, body) = post(state.clone(), "/v1/application/cfg-1/jwt/authenticate", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["configurationId"], "cfg-1");
        let app_token = body["appToken"].as_str().unwrap().to_string();
        let symphony_token = pairing.symphony_token("cfg-1", &app_token).unwrap();

        let (status, body) = post(
            state,
            "/v1/application/cfg-1/jwt/tokens/validate",
            json!({"applicationToken": app_token, "symphonyToken": symphony_token}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"configurationId": "cfg-1", "appToken": app_token, "symphonyToken": symphony_token})
        );
    }

    #[tokio::test]
    async fn mismatched_pair_is_unauthorized() {
        let state = state_with(Arc::new(FakePairingApi::default())).await;

        let (status, body) = post(
            state,
            "/v1/application/cfg-1/jwt/tokens/validate",
            json!({"applicationToken": "ta", "symphonyToken": "ts"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "unauthorized");
    }

    #[tokio::test]
    async fn missing_token_is_bad_request() {
        let pairing = Arc::new(FakePairingApi::default());
        let state = state_with(pairing.clone()).await;

        let (status, body) = post(
            state,
            "/v1/application/cfg-1/jwt/tokens/validate",
            json!({"applicationToken": "ta"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "bad_request");
        assert_eq!(pairing.lookups(), 0);
    }

    #[tokio::test]
    async fn pairing_outage_is_service_unavailable() {
        let state = state_with(Arc::new(FakePairingApi::failing(BackendError::Connectivity(
            "connection refused".to_string(),
        ))))
        .await;

        let (status, body) = post(state, "/v1/application/cfg-1/jwt/authenticate", json!({})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error_code"], "app_pairing_connectivity");
    }
}
