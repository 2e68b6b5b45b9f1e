// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! ## Client-facing collapse
//!
//! Every verification failure renders the same `401` body, `Invalid or expired
//! token`. Clients never learn which check failed. The verifier logs the
//! specific variant before it reaches this layer.
//!
//! Authorization denials are different: the token was valid, so the `403`
//! body may name the candidates and the role that would have been accepted.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::authz::{Candidate, Denial};

/// Message returned to clients for every token verification failure.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// Authentication and authorization error type.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,

    /// Header present but not `Bearer <token>`
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,

    /// Not a syntactically valid signed token, or the header cannot be parsed
    #[error("Token is malformed: {0}")]
    MalformedToken(String),

    /// Header `kid` is absent from the identity provider's key set
    #[error("No signing key matches kid '{0}'")]
    UnknownSigningKey(String),

    /// Header names an algorithm other than RS256
    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Signature does not verify against the selected key
    #[error("Token signature is invalid")]
    InvalidSignature,

    /// `iss` is missing or differs from the configured issuer
    #[error("Token issuer does not match the configured issuer")]
    IssuerMismatch,

    /// `aud` is missing or does not contain the configured audience
    #[error("Token audience does not contain the configured audience")]
    AudienceMismatch,

    /// `exp` is in the past
    #[error("Token has expired")]
    TokenExpired,

    /// `nbf` is in the future
    #[error("Token is not yet valid")]
    TokenNotYetValid,

    /// Discovery or JWKS fetch failed, timed out, or returned a non-success status
    #[error("Identity provider unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Discovery document lacks a usable `jwks_uri`
    #[error("Discovery document is malformed: {0}")]
    MalformedDiscoveryDocument(String),

    /// Ranked authorization was asked to decide over an empty candidate list
    #[error("No classification candidates to authorize against")]
    NoCandidates,

    /// Verified caller lacks the permission for the requested action
    #[error("{}", .0.message)]
    Forbidden(Denial),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

#[derive(Serialize)]
struct DenialBody<'a> {
    error: &'a str,
    error_code: &'static str,
    reason: crate::authz::DecisionReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_role: Option<&'a str>,
    candidates: &'a [Candidate],
}

impl AuthError {
    /// Detailed error code, for logs only.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::UnknownSigningKey(_) => "unknown_signing_key",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::UpstreamUnavailable(_) => "upstream_unavailable",
            AuthError::MalformedDiscoveryDocument(_) => "malformed_discovery_document",
            AuthError::NoCandidates => "no_candidates",
            AuthError::Forbidden(_) => "insufficient_permissions",
        }
    }

    /// Whether this error means the bearer token could not be trusted.
    pub fn is_verification_failure(&self) -> bool {
        !matches!(
            self,
            AuthError::MissingAuthHeader
                | AuthError::InvalidAuthHeader
                | AuthError::NoCandidates
                | AuthError::Forbidden(_)
        )
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NoCandidates | AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            AuthError::Forbidden(denial) => {
                let body = DenialBody {
                    error: &denial.message,
                    error_code: "insufficient_permissions",
                    reason: denial.reason,
                    required_role: denial.required_role.as_deref(),
                    candidates: &denial.candidates,
                };
                (status, Json(body)).into_response()
            }
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => {
                let body = AuthErrorBody {
                    error: "Missing bearer token".to_string(),
                    error_code: "missing_bearer_token".to_string(),
                };
                (status, Json(body)).into_response()
            }
            AuthError::NoCandidates => {
                let body = AuthErrorBody {
                    error: AuthError::NoCandidates.to_string(),
                    error_code: "no_candidates".to_string(),
                };
                (status, Json(body)).into_response()
            }
            _ => {
                let body = AuthErrorBody {
                    error: INVALID_TOKEN_MESSAGE.to_string(),
                    error_code: "invalid_token".to_string(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}
