// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory token cache.
//!
//! Each identity gets its own slot, so writing identity A's token never
//! waits on a reader of identity B. The outer map is only write-locked when
//! an identity is seen for the first time. There is no TTL: tokens live
//! until they are replaced or invalidated.
//!
//! A secondary index maps live session tokens back to their identity so
//! outbound callers holding only a session token can find the right TLS
//! client. Slot swaps happen while the index is write-locked, so the index
//! never names a token the slot no longer holds.
//!
//! The index also remembers the session token each identity last retired.
//! A caller that got a 401 with that token can still be routed to its
//! identity after someone else already refreshed it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::token::AuthenticationToken;

type Slot = Arc<RwLock<AuthenticationToken>>;

#[derive(Debug, Default)]
struct SessionIndex {
    /// Live session token → identity.
    current: HashMap<String, String>,
    /// Identity → the session token its last replace or invalidate retired.
    retired: HashMap<String, String>,
}

impl SessionIndex {
    fn retire(&mut self, identity: &str, previous: &AuthenticationToken) {
        if previous.is_void() {
            return;
        }
        let session_token = previous.session_token();
        if self.current.get(session_token).map(String::as_str) == Some(identity) {
            self.current.remove(session_token);
        }
        self.retired
            .insert(identity.to_string(), session_token.to_string());
    }
}

/// Identity → current token, plus session token → identity.
#[derive(Debug, Default)]
pub struct TokenCache {
    slots: RwLock<HashMap<String, Slot>>,
    sessions: RwLock<SessionIndex>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_slot(&self, identity: &str) -> Option<Slot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    fn slot(&self, identity: &str) -> Slot {
        if let Some(slot) = self.existing_slot(identity) {
            return slot;
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    /// Replace the token of `identity`.
    pub fn put(&self, identity: &str, token: AuthenticationToken) {
        let slot = self.slot(identity);
        let session_token = (!token.is_void()).then(|| token.session_token().to_string());

        // Index before slot, everywhere.
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(
            &mut *slot.write().unwrap_or_else(PoisonError::into_inner),
            token,
        );
        sessions.retire(identity, &previous);
        if let Some(session_token) = session_token {
            sessions.current.insert(session_token, identity.to_string());
        }
    }

    /// Current token of `identity`; void when absent.
    pub fn get(&self, identity: &str) -> AuthenticationToken {
        self.existing_slot(identity)
            .map(|slot| slot.read().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }

    /// Void the token of `identity`. Returns the token that was replaced.
    pub fn invalidate(&self, identity: &str) -> AuthenticationToken {
        let Some(slot) = self.existing_slot(identity) else {
            return AuthenticationToken::void();
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::take(&mut *slot.write().unwrap_or_else(PoisonError::into_inner));
        sessions.retire(identity, &previous);
        previous
    }

    /// Identity currently holding `session_token`.
    pub fn identity_for_session(&self, session_token: &str) -> Option<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .get(session_token)
            .cloned()
    }

    /// Like [`identity_for_session`](Self::identity_for_session), but also
    /// matches the session token an identity most recently retired.
    pub fn identity_for_recent_session(&self, session_token: &str) -> Option<String> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.current.get(session_token).cloned().or_else(|| {
            sessions
                .retired
                .iter()
                .find(|(_, retired)| retired.as_str() == session_token)
                .map(|(identity, _)| identity.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_absent_is_void() {
        let cache = TokenCache::new();
        assert!(cache.get("jira1").is_void());
    }

    #[test]
    fn put_then_get() {
        let cache = TokenCache::new();
        cache.put("jira1", AuthenticationToken::new("s1", "k1"));

        let token = cache.get("jira1");
        assert_eq!(token.session_token(), "s1");
        assert_eq!(token.key_manager_token(), "k1");
        assert_eq!(cache.identity_for_session("s1").as_deref(), Some("jira1"));
    }

    #[test]
    fn put_replaces_and_reindexes() {
        let cache = TokenCache::new();
        cache.put("jira1", AuthenticationToken::new("s1", "k1"));
        cache.put("jira1", AuthenticationToken::new("s2", "k2"));

        assert_eq!(cache.get("jira1").session_token(), "s2");
        assert!(cache.identity_for_session("s1").is_none());
        assert_eq!(cache.identity_for_session("s2").as_deref(), Some("jira1"));
    }

    #[test]
    fn invalidate_voids_and_unindexes() {
        let cache = TokenCache::new();
        cache.put("jira1", AuthenticationToken::new("s1", "k1"));

        let previous = cache.invalidate("jira1");
        assert_eq!(previous.session_token(), "s1");
        assert!(cache.get("jira1").is_void());
        assert!(cache.identity_for_session("s1").is_none());
    }

    #[test]
    fn invalidate_unknown_identity_is_noop() {
        let cache = TokenCache::new();
        assert!(cache.invalidate("nobody").is_void());
    }

    #[test]
    fn identities_are_independent() {
        let cache = TokenCache::new();
        cache.put("jira1", AuthenticationToken::new("s1", "k1"));
        cache.put("github", AuthenticationToken::new("s2", "k2"));

        cache.invalidate("jira1");
        assert!(cache.get("jira1").is_void());
        assert_eq!(cache.get("github").session_token(), "s2");
    }

    #[test]
    fn shared_session_token_is_not_dropped_by_other_identity() {
        let cache = TokenCache::new();
        cache.put("jira1", AuthenticationToken::new("shared", "k1"));
        cache.put("github", AuthenticationToken::new("shared", "k2"));

        cache.invalidate("jira1");
        assert_eq!(cache.identity_for_session("shared").as_deref(), Some("github"));
    }

    #[test]
    fn retired_session_resolves_only_through_recent_lookup() {
        let cache = TokenCache::new();
        cache.put("jira1", AuthenticationToken::new("s1", "k1"));
        cache.invalidate("jira1");
        cache.put("jira1", AuthenticationToken::new("s2", "k2"));

        assert!(cache.identity_for_session("s1").is_none());
        assert_eq!(cache.identity_for_recent_session("s1").as_deref(), Some("jira1"));
        assert_eq!(cache.identity_for_recent_session("s2").as_deref(), Some("jira1"));

        cache.put("jira1", AuthenticationToken::new("s3", "k3"));
        assert!(cache.identity_for_recent_session("s1").is_none());
        assert_eq!(cache.identity_for_recent_session("s2").as_deref(), Some("jira1"));
    }

    #[test]
    fn racing_put_and_invalidate_keep_index_in_step_with_slot() {
        let cache = Arc::new(TokenCache::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for round in 0..500 {
                        if (i + round) % 2 == 0 {
                            cache.put(
                                "jira1",
                                AuthenticationToken::new(format!("s{i}-{round}"), "k"),
                            );
                        } else {
                            cache.invalidate("jira1");
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let token = cache.get("jira1");
        let sessions = cache.sessions.read().unwrap();
        if token.is_void() {
            assert!(sessions.current.is_empty());
        } else {
            assert_eq!(sessions.current.len(), 1);
            assert_eq!(
                sessions.current.get(token.session_token()).map(String::as_str),
                Some("jira1")
            );
        }
    }

    #[test]
    fn concurrent_writers_on_distinct_identities() {
        let cache = Arc::new(TokenCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let identity = format!("bot{i}");
                    for round in 0..100 {
                        cache.put(
                            &identity,
                            AuthenticationToken::new(format!("s{i}-{round}"), format!("k{i}-{round}")),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..8 {
            let token = cache.get(&format!("bot{i}"));
            assert_eq!(token.session_token(), format!("s{i}-99"));
            assert_eq!(token.key_manager_token(), format!("k{i}-99"));
        }
    }
}
