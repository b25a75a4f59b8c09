// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{AppAuthenticationProxy, AuthenticationProxy};

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: Arc<AuthenticationProxy>,
    pub app_auth: Arc<AppAuthenticationProxy>,
}

impl AppState {
    pub fn new(auth: Arc<AuthenticationProxy>, app_auth: AppAuthenticationProxy) -> Self {
        Self {
            auth,
            app_auth: Arc::new(app_auth),
        }
    }
}
