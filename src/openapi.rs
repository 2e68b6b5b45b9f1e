// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OpenAPI components for services that expose identity and decisions.
//!
//! Merge into an application's own document:
//!
//! ```rust,ignore
//! let mut doc = ApiDoc::openapi();
//! doc.merge(AuthSchemas::openapi());
//! ```

use utoipa::OpenApi;

use crate::auth::{AuthenticatedUser, RoleSet, RoleSource};
use crate::authz::{AuthorizationDecision, Candidate, DecisionReason, Denial};

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(
            AuthenticatedUser,
            RoleSet,
            RoleSource,
            Candidate,
            AuthorizationDecision,
            DecisionReason,
            Denial
        )
    ),
    tags(
        (name = "Auth", description = "Bearer token identity and role-based decisions")
    )
)]
pub struct AuthSchemas;
