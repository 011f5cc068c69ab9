use axum::extract::FromRequestParts;
use http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// The `aud` claim, which JWTs may carry either as a single string or as a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Claims of a token whose signature, expiry, audience and issuer have been verified.
///
/// Only the verifier constructs these from a raw token; everything downstream (scope checks, handlers) reads them
/// from the request extensions instead of decoding the token again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: Audience,
    pub exp: u64,
    /// Verified email addresses of the signed-in user.
    #[serde(default)]
    pub emails: Vec<String>,
    /// Space-delimited scopes granted to the calling application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scp: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scp.as_deref().unwrap_or_default().split_whitespace()
    }

    /// Exact, case-sensitive match of `required` against the granted scopes.
    pub fn has_scope(&self, required: &str) -> bool {
        self.scopes().any(|scope| scope == required)
    }
}

impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Claims>().cloned().ok_or_else(|| {
            tracing::error!("no verified claims on request, is the AuthorizationLayer missing?");
            AuthError::header_missing()
        })
    }
}
