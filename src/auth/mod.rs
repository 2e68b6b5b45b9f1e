// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer token verification against an OpenID Connect identity provider.
//!
//! ## Auth Flow
//!
//! 1. Client authenticates with the identity provider
//! 2. Client sends `Authorization: Bearer <JWT>`
//! 3. This service:
//!    - Fetches the provider's JWKS (via discovery or a static URL)
//!    - Verifies the RS256 signature, issuer, expiry and audience
//!    - Extracts:
//!      - `sub` and profile claims into an [`AuthenticatedUser`]
//!      - realm and client roles into a [`RoleSet`]
//!
//! ## Security
//!
//! - Only RS256 is accepted; the header `kid` must match a published key
//! - Signing keys are cached with a TTL and refreshed on rotation
//! - No clock skew tolerance
//! - Every verification failure is rendered to clients identically

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod roles;
pub mod verifier;

pub use claims::{AuthenticatedUser, Claims};
pub use error::AuthError;
pub use extractor::{bearer_token, Auth};
pub use jwks::{JwksEndpoint, SigningKeyStore};
pub use roles::{extract_roles, RoleSet, RoleSource};
pub use verifier::{AudiencePolicy, TokenVerifier};
