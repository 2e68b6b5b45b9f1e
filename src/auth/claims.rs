// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified token claims and the authenticated user derived from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::error::AuthError;
use super::roles::RoleSet;

/// Claim names checked, in order, for the caller's tenant.
const TENANT_CLAIMS: [&str; 3] = ["tenant", "org", "organization"];

/// Decoded claims of a verified token.
///
/// Kept as an opaque JSON object: identity providers add claims freely and
/// only a handful are read here. Never cached beyond the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// A claim's value if it is a string.
    pub fn str_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    pub fn issuer(&self) -> Option<&str> {
        self.str_claim("iss")
    }

    /// `exp` as a Unix timestamp.
    pub fn expires_at(&self) -> Option<i64> {
        self.0.get("exp").and_then(Value::as_i64)
    }

    /// First of `tenant`, `org`, `organization` that holds a string.
    pub fn tenant(&self) -> Option<&str> {
        TENANT_CLAIMS.iter().find_map(|name| self.str_claim(name))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Authenticated caller, as exposed by "who am I" endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Identity provider subject (`sub`)
    #[serde(rename = "sub")]
    pub subject: String,

    /// `preferred_username`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    /// Deduplicated realm and client roles, with their provenance
    #[serde(flatten)]
    pub roles: RoleSet,

    /// Token issuer (not serialized)
    #[serde(skip)]
    pub issuer: String,

    /// Token expiration as a Unix timestamp (not serialized)
    #[serde(skip)]
    pub expires_at: Option<i64>,
}

impl AuthenticatedUser {
    /// Build from verified claims and the roles extracted from them.
    pub fn from_claims(claims: &Claims, roles: RoleSet) -> Result<Self, AuthError> {
        let subject = claims
            .subject()
            .ok_or_else(|| AuthError::MalformedToken("token has no string sub claim".into()))?;
        let owned = |name: &str| claims.str_claim(name).map(str::to_owned);

        Ok(Self {
            subject: subject.to_owned(),
            username: owned("preferred_username"),
            email: owned("email"),
            name: owned("name"),
            given_name: owned("given_name"),
            family_name: owned("family_name"),
            tenant: claims.tenant().map(str::to_owned),
            roles,
            issuer: claims.issuer().unwrap_or_default().to_owned(),
            expires_at: claims.expires_at(),
        })
    }

    /// Check if the user holds `role` exactly.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
