use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use http::header::AUTHORIZATION;
use jsonwebtoken::jwk::JwkSet;
use tower_layer::Layer;
use tower_service::Service;

use crate::bearer::extract_bearer;
use crate::key_set_cache::KeySetCache;
use crate::key_source::KeySource;
use crate::{AuthError, Claims, TokenVerifier};

/// Authenticates every request before handing it to the inner service.
///
/// On success the verified [`Claims`] are inserted into the request extensions. Otherwise the inner service is never
/// called and the [`AuthError`] is rendered as the response.
#[derive(Clone)]
pub struct AuthorizationLayer {
    key_source: KeySource,
    verifier: TokenVerifier,
}

impl AuthorizationLayer {
    pub fn with_remote_key_set(cache: KeySetCache, verifier: TokenVerifier) -> Self {
        Self {
            key_source: KeySource::Remote(cache),
            verifier,
        }
    }

    pub fn with_static_key_set(jwk_set: JwkSet, verifier: TokenVerifier) -> Self {
        Self {
            key_source: jwk_set.into(),
            verifier,
        }
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            key_source: self.key_source.clone(),
            verifier: self.verifier.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationService<S> {
    inner: S,
    key_source: KeySource,
    verifier: TokenVerifier,
}

impl<S> Service<Request> for AuthorizationService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // Move the original service into the future instead of its clone, which might not be ready yet.
        // See [docs](https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services).
        let inner_clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner_clone);

        let key_source = self.key_source.clone();
        let verifier = self.verifier.clone();
        Box::pin(async move {
            let authorize_result = authorize_request(&mut req, &key_source, &verifier).await;
            match authorize_result {
                Ok(claims) => {
                    req.extensions_mut().insert(claims);
                    inner.call(req).await
                }
                Err(auth_error) => {
                    tracing::debug!(
                        code = auth_error.code(),
                        status = %auth_error.status(),
                        uri = %req.uri(),
                        "request denied"
                    );
                    Ok(auth_error.into_response())
                }
            }
        })
    }
}

async fn authorize_request(
    req: &mut Request,
    key_source: &KeySource,
    verifier: &TokenVerifier,
) -> Result<Claims, AuthError> {
    let token = extract_bearer(req.headers().get(AUTHORIZATION))?;
    authorize_token(token, key_source, verifier).await
}

/// Resolves the signing key named by the token header and verifies the token with it.
pub async fn authorize_token(
    token: &str,
    key_source: &KeySource,
    verifier: &TokenVerifier,
) -> Result<Claims, AuthError> {
    // Only the kid is taken from the unverified header, to pick the key the signature is checked against.
    let header = TokenVerifier::unverified_header(token)?;
    let kid = header.kid.ok_or_else(|| {
        tracing::debug!("token header has no kid");
        AuthError::no_matching_key()
    })?;

    let jwk = key_source
        .find(&kid)
        .await
        .map_err(|err| {
            tracing::warn!(%kid, error = %err, "unable to resolve signing key");
            AuthError::unparseable_token()
        })?
        .ok_or_else(|| {
            tracing::debug!(%kid, "no signing key with matching kid");
            AuthError::no_matching_key()
        })?;

    verifier.verify(token, &jwk)
}
