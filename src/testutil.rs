// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared test fixtures: a fake identity provider and RS256 token signing.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::auth::jwks::{DocumentFetcher, JwksEndpoint, SigningKeyStore};
use crate::auth::verifier::{AudiencePolicy, TokenVerifier};
use crate::auth::AuthError;

pub const ISSUER: &str = "https://idp.example.com/realms/classifier";
pub const DISCOVERY_URL: &str =
    "https://idp.example.com/realms/classifier/.well-known/openid-configuration";
pub const JWKS_URL: &str = "https://idp.example.com/realms/classifier/protocol/openid-connect/certs";
pub const AUDIENCE: &str = "classifier-api";
pub const CLIENT_ID: &str = "classifier-frontend";

pub const PRIMARY_KID: &str = "primary";
pub const ROTATED_KID: &str = "rotated";

const PRIMARY_PEM: &str = include_str!("../testdata/signing_key_primary.pem");
const ROTATED_PEM: &str = include_str!("../testdata/signing_key_rotated.pem");

const PRIMARY_N: &str = "urUToGrs5i5u5bciknXOKg7C4jtIhKa105NhDPliNMbnESMSWDBAqhVCABAcUv419BlcRBpUXZfjTrHezPy13F3YHVJG1JdYGkQfrHIIBLN0Z76t5n_6HA5rhnItg-psHd-Vjboh_qd1oNaU2i8V2R2KfWlNzzp3iiEBX7n9LlgYj2BFST2hS3cHn5rj3OT6ataYROkGPeF2G0TyVsjNRYhcC9LRilQuQsmbCo4dzKW0OMrLvm4TzXAuhimMp3HIwcdc0uz9GthuDCin1j1mGjR_QgKp2swMkIGxkfz8ih8ClftpiREfR6YTtNrd4Pqm3lMnFKYB75NIQvZGN4laDQ";
const ROTATED_N: &str = "wq3bp6aPyCeKMo7VYB-SRars42AY00KdhSLhdS_eKfASu6sTlTRkQsNtirqaQTgjtiuTSce5ORnH4_psAVta8V9JitRb81XbRUvsOWP-s1RS7sRb7TyzyLlMuiJtQpPwnqRaPVbj5CpBUL6ogiHqGuhl67zWPAnP2As2vDf8BrYK-kWwUXBJauKjRbQCdwgwpoxwiraDEt-vu5t3WcSbxcfqWUoSK1JXk4zyFgthRyQgKUV--Zq2y5LTxBoCqsmXRo9AnizcJDxnOjFU_7sq9XRWZF5vB4rd2IBLXCA-o_3xvfmQaKgdlaaVTc_BHKsYxVcvhMPG-cdCpwJ5vB0dwQ";

/// Which checked-in RSA key signs a test token.
#[derive(Debug, Clone, Copy)]
pub enum TestKey {
    Primary,
    Rotated,
}

impl TestKey {
    fn encoding_key(self) -> EncodingKey {
        let pem = match self {
            TestKey::Primary => PRIMARY_PEM,
            TestKey::Rotated => ROTATED_PEM,
        };
        EncodingKey::from_rsa_pem(pem.as_bytes()).expect("test RSA key")
    }
}

fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({ "kty": "RSA", "use": "sig", "alg": "RS256", "kid": kid, "n": n, "e": "AQAB" })
}

pub fn primary_jwk() -> Value {
    rsa_jwk(PRIMARY_KID, PRIMARY_N)
}

pub fn rotated_jwk() -> Value {
    rsa_jwk(ROTATED_KID, ROTATED_N)
}

pub fn jwks_document(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

pub fn discovery_document(jwks_uri: &str) -> Value {
    json!({ "issuer": ISSUER, "jwks_uri": jwks_uri })
}

/// Identity provider double serving canned documents and counting GETs per URL.
#[derive(Default)]
pub struct FakeFetcher {
    documents: Mutex<HashMap<String, Value>>,
    calls: Mutex<HashMap<String, usize>>,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, url: &str, document: Value) -> Self {
        self.set_document(url, document);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_document(&self, url: &str, document: Value) {
        self.documents.lock().unwrap().insert(url.to_string(), document);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DocumentFetcher for FakeFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, AuthError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthError::UpstreamUnavailable(format!("HTTP 503 from {url}")));
        }

        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AuthError::UpstreamUnavailable(format!("HTTP 404 from {url}")))
    }
}

/// Discovery and JWKS documents for [`ISSUER`], publishing `keys`.
pub fn fake_identity_provider(keys: Vec<Value>) -> FakeFetcher {
    FakeFetcher::new()
        .with_document(DISCOVERY_URL, discovery_document(JWKS_URL))
        .with_document(JWKS_URL, jwks_document(keys))
}

pub fn key_store(fetcher: &Arc<FakeFetcher>) -> Arc<SigningKeyStore> {
    Arc::new(SigningKeyStore::new(
        JwksEndpoint::for_issuer(ISSUER),
        fetcher.clone(),
    ))
}

pub fn verifier(fetcher: &Arc<FakeFetcher>) -> TokenVerifier {
    TokenVerifier::new(
        key_store(fetcher),
        ISSUER,
        AudiencePolicy::Require(AUDIENCE.to_string()),
    )
}

/// Claims of a valid token for [`ISSUER`] and [`AUDIENCE`], expiring in an hour.
pub fn valid_claims() -> Value {
    let now = get_current_timestamp();
    json!({
        "iss": ISSUER,
        "aud": [AUDIENCE, "account"],
        "sub": "f7c1a3d0-user",
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
        "preferred_username": "mrossi",
        "email": "mario.rossi@example.com",
        "name": "Mario Rossi",
        "given_name": "Mario",
        "family_name": "Rossi",
        "tenant": "acme",
        "realm_access": { "roles": ["offline_access", "dog-access"] },
        "resource_access": {
            CLIENT_ID: { "roles": ["cat-access", "dog-access"] },
            "account": { "roles": ["manage-account"] }
        }
    })
}

pub fn sign_token(key: TestKey, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_owned);
    encode(&header, claims, &key.encoding_key()).expect("sign test token")
}

/// RS256 token signed with the primary key under [`PRIMARY_KID`].
pub fn primary_token(claims: &Value) -> String {
    sign_token(TestKey::Primary, Some(PRIMARY_KID), claims)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory sink for log lines written during a test.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a debug-level subscriber and return what it logged.
pub fn capture_debug_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let output = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    (output, logs)
}
