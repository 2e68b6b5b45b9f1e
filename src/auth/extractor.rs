// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require a valid bearer token:
//!
//! ```rust,ignore
//! async fn classify(
//!     Auth(user): Auth,
//!     State(state): State<AuthState>,
//!     Json(candidates): Json<Vec<Candidate>>,
//! ) -> Result<Json<AuthorizationDecision>, AuthError> {
//!     let decision = state.engine().authorize_ranked(&user.roles, &candidates);
//!     Ok(Json(decision.into_result()?))
//! }
//! ```

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use super::{AuthError, AuthenticatedUser};
use crate::state::AuthState;

/// Extractor for authenticated users.
///
/// Works with any application state that exposes an [`AuthState`] through
/// `FromRef`. The user is cached in the request extensions, so extracting it
/// twice verifies the token once.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let token = bearer_token(&parts.headers)?;
        let user = AuthState::from_ref(state).authenticate(token).await?;
        parts.extensions.insert(user.clone());

        Ok(Auth(user))
    }
}

/// Token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// ignored.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}
