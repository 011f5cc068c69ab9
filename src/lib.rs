//! Account API for Azure AD B2C users, guarded by bearer-token authentication and scope-based authorization.
//!
//! ## Overview
//!
//! Callers present an access token issued by an Azure AD B2C user flow. Every protected request passes through a
//! fixed sequence of stages, each of which either hands a value to the next one or ends the request with an
//! [`AuthError`]:
//!
//! 1. **Token extraction**: the `Authorization` header must carry exactly `Bearer <token>`.
//! 2. **Key resolution**: the token header's `kid` selects one of the tenant's published signing keys. Keys are
//!    fetched from the policy's discovery endpoint and cached by a [`KeySetCache`], which refreshes on expiry or when
//!    an unknown `kid` shows up after a key rotation, with at most one fetch in flight at a time.
//! 3. **Verification**: the [`TokenVerifier`] checks the RS256 signature, expiry, audience (the API's client id) and
//!    issuer (the tenant).
//! 4. **Scope check**: a [`RequireScopeLayer`] admits the request only if the verified [`Claims`] grant the scope
//!    the route requires.
//!
//! Stages 1–3 are run by the [`AuthorizationLayer`], a `tower` layer that inserts the verified [`Claims`] into the
//! request extensions. Handlers take [`Claims`] as an extractor.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use b2c_accounts_api::{AuthorizationLayer, Claims, KeySetCache, RequireScopeLayer, TokenVerifier};
//! use std::time::Duration;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key_set_cache = KeySetCache::builder(Url::parse(
//!         "https://contoso.b2clogin.com/contoso.onmicrosoft.com/B2C_1_signupsignin1/discovery/v2.0/keys",
//!     )?)
//!     .with_cache(Duration::from_secs(3600))
//!     .build();
//!     let verifier = TokenVerifier::new("https://contoso.b2clogin.com/<tenant-id>/v2.0/", "<api-client-id>");
//!
//!     let router = Router::new()
//!         .route("/me", get(|claims: Claims| async move { claims.emails.join(",") }))
//!         .route_layer(RequireScopeLayer::new("Accounts.Read"))
//!         .route_layer(AuthorizationLayer::with_remote_key_set(key_set_cache, verifier));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5001").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod api;
pub mod authorization;
pub mod bearer;
pub mod config;
pub mod key_set_cache;
pub mod key_source;
pub mod scope;
pub mod telemetry;

pub use authorization::AuthorizationLayer;
pub use claims::{Audience, Claims};
pub use error::{AuthError, Error};
pub use key_set_cache::KeySetCache;
pub use scope::RequireScopeLayer;
pub use verifier::TokenVerifier;

mod claims;
mod error;
mod verifier;

#[cfg(test)]
mod test_support;
