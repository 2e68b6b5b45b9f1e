// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Authentication and authorization settings, read once from the environment
//! at startup and immutable afterwards.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `OIDC_ISSUER_URL` | Expected `iss` claim, base URL for discovery | Required |
//! | `OIDC_AUDIENCE` | Expected `aud` entry | Required unless skipped |
//! | `OIDC_SKIP_AUDIENCE_CHECK` | `true` to deliberately skip the audience check | `false` |
//! | `OIDC_CLIENT_ID` | Client whose `resource_access` roles are collected | Optional |
//! | `OIDC_JWKS_URL` | Static JWKS endpoint, bypasses discovery | Optional |
//! | `JWKS_CACHE_TTL_SECS` | Signing key cache lifetime | `3600` |
//! | `JWKS_FETCH_TIMEOUT_SECS` | Bound on one key refresh | `10` |
//! | `JWKS_REFRESH_COOLDOWN_SECS` | Minimum spacing of unknown-`kid` refreshes | `60` |
//! | `AUTHZ_CONFIDENCE_THRESHOLD` | Minimum candidate confidence, in `[0, 1]` | `0.40` |
//! | `AUTHZ_ROLE_SUFFIX` | Suffix turning a label into a role | `-access` |
//! | `AUTHZ_ADMIN_ROLE` | Administrative override role | `admin` |
//! | `AUTHZ_TOP_K` | Cap on how many candidates are scanned | All |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::auth::jwks::{
    JwksEndpoint, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, DEFAULT_REFRESH_COOLDOWN,
};
use crate::auth::verifier::AudiencePolicy;
use crate::authz::engine::{
    DEFAULT_ADMIN_ROLE, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_ROLE_SUFFIX,
};

pub const ISSUER_URL_ENV: &str = "OIDC_ISSUER_URL";
pub const AUDIENCE_ENV: &str = "OIDC_AUDIENCE";
pub const SKIP_AUDIENCE_CHECK_ENV: &str = "OIDC_SKIP_AUDIENCE_CHECK";
pub const CLIENT_ID_ENV: &str = "OIDC_CLIENT_ID";
pub const JWKS_URL_ENV: &str = "OIDC_JWKS_URL";
pub const CACHE_TTL_ENV: &str = "JWKS_CACHE_TTL_SECS";
pub const FETCH_TIMEOUT_ENV: &str = "JWKS_FETCH_TIMEOUT_SECS";
pub const REFRESH_COOLDOWN_ENV: &str = "JWKS_REFRESH_COOLDOWN_SECS";
pub const CONFIDENCE_THRESHOLD_ENV: &str = "AUTHZ_CONFIDENCE_THRESHOLD";
pub const ROLE_SUFFIX_ENV: &str = "AUTHZ_ROLE_SUFFIX";
pub const ADMIN_ROLE_ENV: &str = "AUTHZ_ADMIN_ROLE";
pub const TOP_K_ENV: &str = "AUTHZ_TOP_K";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("OIDC_AUDIENCE is not set; set OIDC_SKIP_AUDIENCE_CHECK=true to skip the audience check")]
    AudienceUnspecified,
}

/// Everything needed to build an [`AuthState`](crate::state::AuthState).
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSettings {
    pub issuer: String,
    pub audience: AudiencePolicy,
    pub client_id: Option<String>,
    pub jwks_url: Option<String>,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    pub refresh_cooldown: Duration,
    pub confidence_threshold: f64,
    pub role_suffix: String,
    pub admin_role: String,
    pub top_k: Option<usize>,
}

impl AuthSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through `lookup`.
    ///
    /// Blank values count as unset, except for the admin role and the role
    /// suffix, which must not be blank when set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let issuer = env.required(ISSUER_URL_ENV)?;
        parse_absolute_url(ISSUER_URL_ENV, &issuer)?;

        let skip_audience = env.parsed(SKIP_AUDIENCE_CHECK_ENV)?.unwrap_or(false);
        let audience = match (env.optional(AUDIENCE_ENV), skip_audience) {
            (Some(audience), false) => AudiencePolicy::Require(audience),
            (None, true) => AudiencePolicy::Skip,
            (Some(audience), true) => {
                return Err(ConfigError::Invalid {
                    name: SKIP_AUDIENCE_CHECK_ENV,
                    value: "true".to_string(),
                    reason: format!("conflicts with {AUDIENCE_ENV}={audience}"),
                })
            }
            (None, false) => return Err(ConfigError::AudienceUnspecified),
        };

        let jwks_url = env.optional(JWKS_URL_ENV);
        if let Some(url) = &jwks_url {
            parse_absolute_url(JWKS_URL_ENV, url)?;
        }

        let cache_ttl = env.non_zero_secs(CACHE_TTL_ENV, DEFAULT_CACHE_TTL)?;
        let fetch_timeout = env.non_zero_secs(FETCH_TIMEOUT_ENV, DEFAULT_FETCH_TIMEOUT)?;
        let refresh_cooldown = env
            .parsed::<u64>(REFRESH_COOLDOWN_ENV)?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REFRESH_COOLDOWN);

        let confidence_threshold = env
            .parsed::<f64>(CONFIDENCE_THRESHOLD_ENV)?
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError::Invalid {
                name: CONFIDENCE_THRESHOLD_ENV,
                value: confidence_threshold.to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }

        Ok(Self {
            issuer,
            audience,
            client_id: env.optional(CLIENT_ID_ENV),
            jwks_url,
            cache_ttl,
            fetch_timeout,
            refresh_cooldown,
            confidence_threshold,
            role_suffix: env.non_blank_or_default(ROLE_SUFFIX_ENV, DEFAULT_ROLE_SUFFIX)?,
            admin_role: env.non_blank_or_default(ADMIN_ROLE_ENV, DEFAULT_ADMIN_ROLE)?,
            top_k: env.parsed(TOP_K_ENV)?,
        })
    }

    /// Static JWKS URL if configured, otherwise discovery from the issuer.
    pub fn jwks_endpoint(&self) -> JwksEndpoint {
        match &self.jwks_url {
            Some(url) => JwksEndpoint::Static(url.clone()),
            None => JwksEndpoint::for_issuer(&self.issuer),
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn non_blank_or_default(&self, name: &'static str, default: &str) -> Result<String, ConfigError> {
        match (self.0)(name) {
            None => Ok(default.to_string()),
            Some(value) if value.trim().is_empty() => Err(ConfigError::Invalid {
                name,
                value,
                reason: "must not be empty".to_string(),
            }),
            Some(value) => Ok(value.trim().to_string()),
        }
    }

    fn parsed<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(name)
            .map(|value| {
                value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    name,
                    reason: e.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn non_zero_secs(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        match self.parsed::<u64>(name)? {
            Some(0) => Err(ConfigError::Invalid {
                name,
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            Some(secs) => Ok(Duration::from_secs(secs)),
            None => Ok(default),
        }
    }
}

fn parse_absolute_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "must be an absolute URL with a host".to_string(),
        });
    }
    Ok(())
}
