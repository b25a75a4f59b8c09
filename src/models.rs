// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the extension-app endpoints. Field names
//! are camelCase on the wire.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result of starting app token pairing for one configuration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppAuthenticateResponse {
    pub configuration_id: String,
    /// Application token the client app must echo back on validation.
    pub app_token: String,
}

/// Token pair presented by a client app.
///
/// Both fields are optional on the wire so a missing field is reported as
/// a 400 rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokensRequest {
    #[serde(default)]
    pub application_token: Option<String>,
    #[serde(default)]
    pub symphony_token: Option<String>,
}

/// A validated `(configurationId, appToken, symphonyToken)` triple.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub configuration_id: String,
    pub app_token: String,
    pub symphony_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_request_tolerates_missing_fields() {
        let request: ValidateTokensRequest =
            serde_json::from_str(r#"{"applicationToken":"ta"}"#).unwrap();
        assert_eq!(request.application_token.as_deref(), Some("ta"));
        assert_eq!(request.symphony_token, None);
    }

    #[test]
    fn responses_use_camel_case() {
        let json = serde_json::to_value(TokenPairResponse {
            configuration_id: "cfg-1".to_string(),
            app_token: "ta".to_string(),
            symphony_token: "ts".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"configurationId": "cfg-1", "appToken": "ta", "symphonyToken": "ts"})
        );
    }
}
