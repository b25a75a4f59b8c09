// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session + key-manager token pair.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Sentinel stored in both token fields of the void token.
pub const VOID_TOKEN: &str = "void";

/// Token pair obtained from one successful authentication round-trip.
///
/// A token is either fully void or fully populated. The only constructors
/// are [`AuthenticationToken::new`] (both fields from one round-trip) and
/// [`AuthenticationToken::void`].
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticationToken {
    session_token: String,
    key_manager_token: String,
    issued_at: Option<DateTime<Utc>>,
}

impl AuthenticationToken {
    /// Create a populated token issued now.
    pub fn new(session_token: impl Into<String>, key_manager_token: impl Into<String>) -> Self {
        Self::issued_at(session_token, key_manager_token, Utc::now())
    }

    /// Create a populated token with an explicit issue time.
    pub fn issued_at(
        session_token: impl Into<String>,
        key_manager_token: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_token: session_token.into(),
            key_manager_token: key_manager_token.into(),
            issued_at: Some(issued_at),
        }
    }

    /// The "not authenticated" token.
    pub fn void() -> Self {
        Self {
            session_token: VOID_TOKEN.to_string(),
            key_manager_token: VOID_TOKEN.to_string(),
            issued_at: None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.issued_at.is_none()
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn key_manager_token(&self) -> &str {
        &self.key_manager_token
    }

    pub fn issued_at_time(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// Time elapsed since issuance; `None` for the void token.
    ///
    /// Clock steps backwards clamp to zero.
    pub fn age(&self) -> Option<Duration> {
        self.issued_at
            .map(|issued| (Utc::now() - issued).to_std().unwrap_or_default())
    }
}

impl Default for AuthenticationToken {
    fn default() -> Self {
        Self::void()
    }
}

// Token values are credentials: keep them out of logs.
impl std::fmt::Debug for AuthenticationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationToken")
            .field("void", &self.is_void())
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}
