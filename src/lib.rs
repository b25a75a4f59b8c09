// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Integration Auth Server - session lifecycle for integration identities
//!
//! This crate authenticates many integration identities against the
//! session-auth and key-manager-auth services with per-identity client
//! certificates, keeps their token pairs, refreshes them on 401, and pairs
//! tokens for extension applications.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Identity store, token cache and authentication coordinator
//! - `bootstrap` - Startup registration and authentication of identities
//! - `config` - Environment configuration

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
