use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower_layer::Layer;
use tower_service::Service;

use crate::{AuthError, Claims};

/// Lets a request through only if its verified [`Claims`] grant `scope`.
///
/// Must run inside an [`AuthorizationLayer`](crate::AuthorizationLayer). Requests without claims are denied like
/// requests lacking the scope.
#[derive(Clone)]
pub struct RequireScopeLayer {
    scope: Arc<str>,
}

impl RequireScopeLayer {
    pub fn new(scope: impl Into<Arc<str>>) -> Self {
        Self {
            scope: scope.into(),
        }
    }
}

impl<S> Layer<S> for RequireScopeLayer {
    type Service = RequireScopeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireScopeService {
            inner,
            scope: Arc::clone(&self.scope),
        }
    }
}

#[derive(Clone)]
pub struct RequireScopeService<S> {
    inner: S,
    scope: Arc<str>,
}

impl<S> Service<Request> for RequireScopeService<S>
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

    fn call(&mut self, req: Request) -> Self::Future {
        let granted = req
            .extensions()
            .get::<Claims>()
            .is_some_and(|claims| claims.has_scope(&self.scope));
        if !granted {
            tracing::debug!(scope = %self.scope, uri = %req.uri(), "required scope missing");
            let response = AuthError::forbidden().into_response();
            return Box::pin(async move { Ok::<_, S::Error>(response) });
        }

        let inner_clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner_clone);
        Box::pin(async move { inner.call(req).await })
    }
}
