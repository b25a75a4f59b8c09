// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    http::{HeaderName, Request},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info_span;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{AppAuthenticateResponse, TokenPairResponse, ValidateTokensRequest},
    state::AppState,
};

pub mod application;
pub mod health;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/application/{configuration_id}/jwt/authenticate",
            post(application::authenticate),
        )
        .route(
            "/application/{configuration_id}/jwt/tokens/validate",
            post(application::validate_tokens),
        )
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(&REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        application::authenticate,
        application::validate_tokens,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            AppAuthenticateResponse,
            ValidateTokensRequest,
            TokenPairResponse,
            health::ReadyResponse,
            health::IdentityHealth,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Application", description = "Extension app token pairing"),
        (name = "Health", description = "Liveness and identity readiness")
    )
)]
struct ApiDoc;
