// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer Authz - OIDC bearer token verification and role-based authorization
//!
//! This crate verifies RS256 access tokens against an identity provider's
//! published signing keys and decides whether the caller may see a
//! classification result, based on the roles the token carries.
//!
//! ## Modules
//!
//! - `auth` - Signing key cache, token verification, role extraction, Axum extractor
//! - `authz` - Allow/deny decisions over roles and ranked candidates
//! - `config` - Environment configuration
//! - `state` - Shared state wiring the pieces together
//! - `openapi` - OpenAPI schemas for the public types

pub mod auth;
pub mod authz;
pub mod config;
pub mod openapi;
pub mod state;

#[cfg(test)]
mod testutil;
