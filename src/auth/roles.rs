// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role collection from identity provider claims.
//!
//! ## Claim Namespaces
//!
//! - `realm_access.roles` - roles granted across the whole realm
//! - `resource_access.<client_id>.roles` - roles granted for one client
//!
//! Both are merged into one [`RoleSet`]. Client roles are appended after realm
//! roles; the provenance tag names the most specific namespace that contributed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::claims::Claims;

/// Namespace that contributed the most specific role in a [`RoleSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleSource {
    /// No roles found
    #[default]
    None,
    /// Realm-wide roles only
    Realm,
    /// At least one client-scoped role
    Client,
}

impl std::fmt::Display for RoleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleSource::None => write!(f, "none"),
            RoleSource::Realm => write!(f, "realm"),
            RoleSource::Client => write!(f, "client"),
        }
    }
}

/// Unique role names in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoleSet {
    roles: Vec<String>,
    #[serde(rename = "roles_source")]
    source: RoleSource,
}

impl RoleSet {
    /// Build a set from `roles`, dropping repeats.
    pub fn from_roles<I, S>(roles: I, source: RoleSource) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = RoleSet::default();
        for role in roles {
            set.insert(role.into());
        }
        if !set.is_empty() {
            set.source = source;
        }
        set
    }

    /// Check exact membership. No prefix, substring or case folding.
    pub fn contains(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.roles
    }

    pub fn source(&self) -> RoleSource {
        self.source
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    fn insert(&mut self, role: String) {
        if !self.contains(&role) {
            self.roles.push(role);
        }
    }

    fn merge(&mut self, roles: Vec<&str>, source: RoleSource) {
        if roles.is_empty() {
            return;
        }
        for role in roles {
            self.insert(role.to_owned());
        }
        self.source = source;
    }
}

/// Collect realm roles, then client roles for `client_id`, from `claims`.
///
/// Never fails. A roles field of the wrong shape counts as absent.
pub fn extract_roles(claims: &Claims, client_id: Option<&str>) -> RoleSet {
    let mut roles = RoleSet::default();

    if let Some(realm) = claims.get("realm_access").and_then(roles_field) {
        roles.merge(realm, RoleSource::Realm);
    }

    if let Some(client_id) = client_id {
        let client = claims
            .get("resource_access")
            .and_then(|resources| resources.get(client_id))
            .and_then(roles_field);
        if let Some(client) = client {
            roles.merge(client, RoleSource::Client);
        }
    }

    roles
}

/// `value.roles` if it is an array made only of strings.
fn roles_field(value: &Value) -> Option<Vec<&str>> {
    value
        .get("roles")?
        .as_array()?
        .iter()
        .map(Value::as_str)
        .collect()
}
