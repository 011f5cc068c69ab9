//! Key material, tokens and a mock discovery endpoint shared by the unit tests.

use std::sync::OnceLock;
use std::time::SystemTime;

use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
    RSAKeyParameters, RSAKeyType,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::TokenVerifier;

pub(crate) const AUDIENCE: &str = "api-client-id";
pub(crate) const ISSUER: &str = "https://contoso.b2clogin.com/tenant-id/v2.0/";
pub(crate) const DISCOVERY_PATH: &str =
    "/contoso.onmicrosoft.com/B2C_1_signupsignin1/discovery/v2.0/keys";

pub(crate) struct TestKey {
    kid: String,
    private_key_der: Vec<u8>,
    jwk: Jwk,
}

impl TestKey {
    pub(crate) fn generate(kid: &str) -> TestKey {
        let rsa_private_key = openssl::rsa::Rsa::generate(2048).unwrap();
        let jwk = Jwk {
            common: CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_algorithm: Some(KeyAlgorithm::RS256),
                key_id: Some(kid.to_string()),
                ..CommonParameters::default()
            },
            algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
                n: base64_url::encode(&rsa_private_key.n().to_vec()),
                e: base64_url::encode(&rsa_private_key.e().to_vec()),
                key_type: RSAKeyType::RSA,
            }),
        };

        TestKey {
            kid: kid.to_string(),
            private_key_der: rsa_private_key.private_key_to_der().unwrap(),
            jwk,
        }
    }

    /// A key with kid `primary`, generated once per test binary.
    pub(crate) fn shared() -> &'static TestKey {
        static KEY: OnceLock<TestKey> = OnceLock::new();
        KEY.get_or_init(|| TestKey::generate("primary"))
    }

    pub(crate) fn kid(&self) -> &str {
        &self.kid
    }

    pub(crate) fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    pub(crate) fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    pub(crate) fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        jsonwebtoken::encode(
            header,
            claims,
            &EncodingKey::from_rsa_der(&self.private_key_der),
        )
        .unwrap()
    }
}

pub(crate) fn jwk_set(keys: &[&TestKey]) -> JwkSet {
    JwkSet {
        keys: keys.iter().map(|key| key.jwk().clone()).collect(),
    }
}

pub(crate) fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Claims as Azure AD B2C issues them for the configured API, valid for an hour.
pub(crate) fn claims(scp: &str) -> serde_json::Value {
    let issued_at = now();
    serde_json::json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "0f3c5c62-7b4e-4c1e-a2a4-5a1c1c1f0b7d",
        "emails": ["homer@example.com"],
        "scp": scp,
        "iat": issued_at,
        "exp": issued_at + 3600,
    })
}

pub(crate) fn verifier() -> TokenVerifier {
    TokenVerifier::new(ISSUER, AUDIENCE)
}

pub(crate) fn discovery_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}{}", server.uri(), DISCOVERY_PATH)).unwrap()
}

pub(crate) fn discovery_response(jwk_set: &JwkSet) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(jwk_set)
}

/// Starts a discovery endpoint serving `jwk_set` that must be hit exactly `expected_fetches` times.
pub(crate) async fn mock_discovery(jwk_set: &JwkSet, expected_fetches: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(discovery_response(jwk_set))
        .expect(expected_fetches)
        .mount(&server)
        .await;
    server
}
