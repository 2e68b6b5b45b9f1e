// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! ## Checks, in order
//!
//! 1. Header parses; `alg` is RS256 (anything else is rejected before any key lookup)
//! 2. Header `kid` resolves to a key in the [`SigningKeyStore`], never a substitute
//! 3. RS256 signature verifies against that key
//! 4. `iss` equals the configured issuer exactly
//! 5. `exp` / `nbf` hold with zero leeway
//! 6. `aud` contains the configured audience, unless explicitly skipped

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Header, Validation};
use serde_json::Value;
use tracing::warn;

use super::claims::Claims;
use super::error::AuthError;
use super::jwks::SigningKeyStore;

/// How the `aud` claim is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudiencePolicy {
    /// `aud` must contain this value.
    Require(String),
    /// Deliberately skip the audience check.
    Skip,
}

/// Verifies bearer tokens issued by one identity provider.
pub struct TokenVerifier {
    keys: Arc<SigningKeyStore>,
    issuer: String,
    audience: AudiencePolicy,
}

impl TokenVerifier {
    pub fn new(keys: Arc<SigningKeyStore>, issuer: impl Into<String>, audience: AudiencePolicy) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &AudiencePolicy {
        &self.audience
    }

    pub fn key_store(&self) -> &Arc<SigningKeyStore> {
        &self.keys
    }

    /// Verify `token` and return its claims.
    ///
    /// Failures are logged here with full detail; callers should render them
    /// generically.
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        match self.verify_token(token).await {
            Ok(claims) => Ok(claims),
            Err(e) => {
                warn!(error_code = e.error_code(), error = %e, "Bearer token rejected");
                Err(e)
            }
        }
    }

    async fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let header = parse_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header
            .kid
            .ok_or_else(|| AuthError::UnknownSigningKey("<none>".to_string()))?;
        let key = self.keys.get_key(&kid).await?;

        let token_data =
            decode::<Claims>(token, key.decoding_key(), &self.validation()).map_err(map_jwt_error)?;
        Ok(token_data.claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);

        match &self.audience {
            AudiencePolicy::Require(audience) => {
                validation.set_audience(&[audience]);
                validation.set_required_spec_claims(&["exp", "iss", "aud"]);
            }
            AudiencePolicy::Skip => {
                validation.validate_aud = false;
                validation.set_required_spec_claims(&["exp", "iss"]);
            }
        }
        validation
    }
}

fn parse_header(token: &str) -> Result<Header, AuthError> {
    decode_header(token).map_err(|e| match declared_algorithm(token) {
        // e.g. `none`, which the JWT library cannot even represent
        Some(alg) if alg != "RS256" => AuthError::UnsupportedAlgorithm(alg),
        _ => AuthError::MalformedToken(e.to_string()),
    })
}

/// `alg` as written in the raw header segment.
fn declared_algorithm(token: &str) -> Option<String> {
    let segment = token.split('.').next()?;
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    let header: Value = serde_json::from_slice(&bytes).ok()?;
    header.get("alg")?.as_str().map(str::to_owned)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
        ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm("expected RS256".into()),
        ErrorKind::MissingRequiredClaim(claim) if claim.as_str() == "iss" => AuthError::IssuerMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim.as_str() == "aud" => {
            AuthError::AudienceMismatch
        }
        _ => AuthError::MalformedToken(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        fake_identity_provider, init_tracing, jwks_document, key_store, primary_jwk,
        primary_token, rotated_jwk, sign_token, valid_claims, verifier, TestKey, AUDIENCE,
        DISCOVERY_URL, ISSUER, JWKS_URL, PRIMARY_KID, ROTATED_KID,
    };
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey};
    use serde_json::json;

    fn provider() -> Arc<crate::testutil::FakeFetcher> {
        init_tracing();
        Arc::new(fake_identity_provider(vec![primary_jwk()]))
    }

    #[tokio::test]
    async fn valid_token_yields_claims() {
        let fetcher = provider();
        let claims = verifier(&fetcher).verify(&primary_token(&valid_claims())).await.unwrap();

        assert_eq!(claims.subject(), Some("f7c1a3d0-user"));
        assert_eq!(claims.issuer(), Some(ISSUER));
    }

    #[tokio::test]
    async fn second_verification_within_ttl_does_not_fetch() {
        let fetcher = provider();
        let verifier = verifier(&fetcher);
        let token = primary_token(&valid_claims());

        verifier.verify(&token).await.unwrap();
        verifier.verify(&token).await.unwrap();

        assert_eq!(fetcher.calls(DISCOVERY_URL), 1);
        assert_eq!(fetcher.calls(JWKS_URL), 1);
    }

    #[tokio::test]
    async fn unknown_kid_is_rejected_without_fallback() {
        let fetcher = provider();
        let token = sign_token(TestKey::Rotated, Some(ROTATED_KID), &valid_claims());

        let result = verifier(&fetcher).verify(&token).await;
        assert!(matches!(result, Err(AuthError::UnknownSigningKey(kid)) if kid == ROTATED_KID));
    }

    #[tokio::test]
    async fn missing_kid_is_rejected() {
        let fetcher = provider();
        let token = sign_token(TestKey::Primary, None, &valid_claims());

        let result = verifier(&fetcher).verify(&token).await;
        assert!(matches!(result, Err(AuthError::UnknownSigningKey(_))));
    }

    #[tokio::test]
    async fn rotated_key_is_accepted_once_published() {
        let fetcher = provider();
        fetcher.set_document(JWKS_URL, jwks_document(vec![primary_jwk(), rotated_jwk()]));
        let token = sign_token(TestKey::Rotated, Some(ROTATED_KID), &valid_claims());

        assert!(verifier(&fetcher).verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn signature_from_another_key_is_invalid() {
        let fetcher = provider();
        let token = sign_token(TestKey::Rotated, Some(PRIMARY_KID), &valid_claims());

        let result = verifier(&fetcher).verify(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[tokio::test]
    async fn hmac_token_is_rejected_before_key_lookup() {
        let fetcher = provider();
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(PRIMARY_KID.to_string());
        let token = encode(&header, &valid_claims(), &EncodingKey::from_secret(b"guessable")).unwrap();

        let result = verifier(&fetcher).verify(&token).await;
        assert!(matches!(result, Err(AuthError::UnsupportedAlgorithm(alg)) if alg == "HS256"));
        assert_eq!(fetcher.calls(JWKS_URL), 0);
    }

    #[tokio::test]
    async fn alg_none_is_unsupported() {
        let fetcher = provider();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","kid":"primary","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(valid_claims().to_string());
        let token = format!("{header}.{payload}.");

        let result = verifier(&fetcher).verify(&token).await;
        assert!(matches!(result, Err(AuthError::UnsupportedAlgorithm(alg)) if alg == "none"));
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let fetcher = provider();
        for token in ["", "not-a-jwt", "a.b.c", "eyJhbGciOiJSUzI1NiJ9"] {
            let result = verifier(&fetcher).verify(token).await;
            assert!(matches!(result, Err(AuthError::MalformedToken(_))), "{token}");
        }
    }

    #[tokio::test]
    async fn issuer_must_match_exactly() {
        let fetcher = provider();
        let mut claims = valid_claims();
        claims["iss"] = json!(format!("{ISSUER}/"));

        let result = verifier(&fetcher).verify(&primary_token(&claims)).await;
        assert!(matches!(result, Err(AuthError::IssuerMismatch)));
    }

    #[tokio::test]
    async fn missing_issuer_is_a_mismatch() {
        let fetcher = provider();
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("iss");

        let result = verifier(&fetcher).verify(&primary_token(&claims)).await;
        assert!(matches!(result, Err(AuthError::IssuerMismatch)));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let fetcher = provider();
        let mut claims = valid_claims();
        claims["exp"] = json!(get_current_timestamp() - 5);

        let result = verifier(&fetcher).verify(&primary_token(&claims)).await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn future_nbf_is_not_yet_valid() {
        let fetcher = provider();
        let mut claims = valid_claims();
        claims["nbf"] = json!(get_current_timestamp() + 600);

        let result = verifier(&fetcher).verify(&primary_token(&claims)).await;
        assert!(matches!(result, Err(AuthError::TokenNotYetValid)));
    }

    #[tokio::test]
    async fn audience_must_be_present_when_required() {
        let fetcher = provider();
        let mut other = valid_claims();
        other["aud"] = json!("another-api");
        let mut absent = valid_claims();
        absent.as_object_mut().unwrap().remove("aud");
        let mut single = valid_claims();
        single["aud"] = json!(AUDIENCE);

        let verifier = verifier(&fetcher);
        assert!(matches!(
            verifier.verify(&primary_token(&other)).await,
            Err(AuthError::AudienceMismatch)
        ));
        assert!(matches!(
            verifier.verify(&primary_token(&absent)).await,
            Err(AuthError::AudienceMismatch)
        ));
        assert!(verifier.verify(&primary_token(&single)).await.is_ok());
    }

    #[tokio::test]
    async fn skipped_audience_accepts_any_aud() {
        let fetcher = provider();
        let verifier = TokenVerifier::new(key_store(&fetcher), ISSUER, AudiencePolicy::Skip);
        let mut claims = valid_claims();
        claims["aud"] = json!("another-api");

        assert!(verifier.verify(&primary_token(&claims)).await.is_ok());
    }

    #[tokio::test]
    async fn upstream_outage_fails_verification() {
        let fetcher = provider();
        fetcher.set_failing(true);

        let result = verifier(&fetcher).verify(&primary_token(&valid_claims())).await;
        assert!(matches!(result, Err(AuthError::UpstreamUnavailable(_))));
    }
}
