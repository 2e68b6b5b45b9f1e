// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tracing::info;

use crate::auth::jwks::{DocumentFetcher, HttpDocumentFetcher, SigningKeyStore};
use crate::auth::{extract_roles, AuthError, AuthenticatedUser, TokenVerifier};
use crate::authz::AuthorizationEngine;
use crate::config::AuthSettings;

/// Shared authentication state, cheap to clone into every request.
///
/// Embed it in an application state and implement `FromRef` to use the
/// [`Auth`](crate::auth::Auth) extractor.
#[derive(Clone)]
pub struct AuthState {
    verifier: Arc<TokenVerifier>,
    engine: Arc<AuthorizationEngine>,
    client_id: Option<String>,
}

impl AuthState {
    pub fn new(verifier: TokenVerifier, engine: AuthorizationEngine, client_id: Option<String>) -> Self {
        Self {
            verifier: Arc::new(verifier),
            engine: Arc::new(engine),
            client_id,
        }
    }

    /// Build state that fetches keys over HTTPS.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        let fetcher = HttpDocumentFetcher::new(settings.fetch_timeout)?;
        Ok(Self::with_fetcher(settings, Arc::new(fetcher)))
    }

    /// Build state around an arbitrary document fetcher.
    pub fn with_fetcher(settings: &AuthSettings, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        let keys = SigningKeyStore::new(settings.jwks_endpoint(), fetcher)
            .with_cache_ttl(settings.cache_ttl)
            .with_fetch_timeout(settings.fetch_timeout)
            .with_refresh_cooldown(settings.refresh_cooldown);
        let verifier = TokenVerifier::new(
            Arc::new(keys),
            settings.issuer.clone(),
            settings.audience.clone(),
        );
        let engine = AuthorizationEngine::new(settings.admin_role.clone())
            .with_threshold(settings.confidence_threshold)
            .with_role_suffix(settings.role_suffix.clone())
            .with_top_k(settings.top_k);

        info!(
            issuer = %settings.issuer,
            jwks = ?settings.jwks_endpoint(),
            audience = ?settings.audience,
            client_id = ?settings.client_id,
            "Bearer authentication configured"
        );
        Self::new(verifier, engine, settings.client_id.clone())
    }

    /// Verify `token` and build the caller's identity with their roles.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.verifier.verify(token).await?;
        let roles = extract_roles(&claims, self.client_id.as_deref());
        AuthenticatedUser::from_claims(&claims, roles)
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn engine(&self) -> &AuthorizationEngine {
        &self.engine
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}
