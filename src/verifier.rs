use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};

use crate::{AuthError, Claims};

/// Verifies RS256 tokens against a resolved signing key and the expected issuer and audience.
#[derive(Clone, Debug)]
pub struct TokenVerifier {
    issuer: String,
    audience: String,
}

impl TokenVerifier {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Decodes the token header without checking the signature.
    ///
    /// Only the `kid` and `alg` fields may be taken from the result; anything else is attacker controlled.
    pub fn unverified_header(token: &str) -> Result<Header, AuthError> {
        let header = decode_header(token).map_err(|err| {
            tracing::debug!(error = %err, "failed to decode token header");
            AuthError::unparseable_token()
        })?;
        if header.alg != Algorithm::RS256 {
            tracing::debug!(alg = ?header.alg, "token is not signed with RS256");
            return Err(AuthError::unparseable_token());
        }
        Ok(header)
    }

    /// Checks signature, expiry, audience and issuer of `token`, in that order.
    ///
    /// Expiry is compared against a single clock reading with no leeway.
    pub fn verify(&self, token: &str, key: &Jwk) -> Result<Claims, AuthError> {
        Self::unverified_header(token)?;

        let decoding_key = match &key.algorithm {
            AlgorithmParameters::RSA(rsa) => {
                DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|err| {
                    tracing::warn!(kid = ?key.common.key_id, error = %err, "invalid RSA key components");
                    AuthError::unparseable_token()
                })?
            }
            _ => {
                tracing::warn!(kid = ?key.common.key_id, "signing key is not an RSA key");
                return Err(AuthError::unparseable_token());
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        // Decoded untyped so that validation, not deserialization, reports missing registered claims.
        let payload = decode::<serde_json::Value>(token, &decoding_key, &validation)
            .map_err(|err| classify(&err))?
            .claims;
        serde_json::from_value::<Claims>(payload).map_err(|err| {
            tracing::debug!(error = %err, "token claims have unexpected shape");
            AuthError::invalid_claims()
        })
    }
}

fn classify(err: &jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::token_expired(),
        ErrorKind::InvalidAudience | ErrorKind::InvalidIssuer | ErrorKind::MissingRequiredClaim(_) => {
            tracing::debug!(error = %err, "token claims rejected");
            AuthError::invalid_claims()
        }
        _ => {
            tracing::debug!(error = %err, "token rejected");
            AuthError::unparseable_token()
        }
    }
}
