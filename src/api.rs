//! HTTP routes of the account API.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::accounts::{AccountStore, StoreError};
use crate::{AuthorizationLayer, Claims, RequireScopeLayer};

pub const READ_SCOPE: &str = "Accounts.Read";
pub const WRITE_SCOPE: &str = "Accounts.Write";

#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountStore,
}

/// Builds the service: `/public` is open, `/acctinfo` and `/acctupdate` require a verified token carrying the
/// read and write scope respectively.
pub fn router(state: AppState, authorization: AuthorizationLayer) -> Router {
    let read = Router::new()
        .route("/acctinfo", get(account_info))
        .route_layer(RequireScopeLayer::new(READ_SCOPE));
    let write = Router::new()
        .route("/acctupdate", get(account_update))
        .route_layer(RequireScopeLayer::new(WRITE_SCOPE));
    let protected = read.merge(write).route_layer(authorization);

    Router::new()
        .route("/public", get(public))
        .merge(protected)
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

async fn public() -> &'static str {
    "Successfully accessed the public API endpoint!"
}

async fn account_info(State(state): State<AppState>, claims: Claims) -> Result<Response, ApiError> {
    match state.accounts.get_or_create(&claims.emails).await? {
        Some(account) => Ok(Json(account).into_response()),
        None => Ok((StatusCode::BAD_REQUEST, "Record not found").into_response()),
    }
}

#[derive(Deserialize)]
struct UpdateParams {
    name: String,
}

async fn account_update(
    State(state): State<AppState>,
    claims: Claims,
    Query(params): Query<UpdateParams>,
) -> Result<Response, ApiError> {
    if state
        .accounts
        .update_beneficiary(&claims.emails, &params.name)
        .await?
    {
        Ok("Success".into_response())
    } else {
        Ok((StatusCode::NOT_FOUND, "Failure").into_response())
    }
}

/// Store failures, reported to the caller without detail.
struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self.0, "account store failure");
        let body = Json(json!({
            "code": "internal_error",
            "description": "Unable to access account information",
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
