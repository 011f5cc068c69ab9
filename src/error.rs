use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde_json::json;

const HEADER_EXPECTED: &str = "Authorization header is expected";
const UNPARSEABLE_TOKEN: &str = "Unable to parse authentication token.";
const NO_MATCHING_KEY: &str = "Unable to find appropriate key";
const TOKEN_EXPIRED: &str = "token is expired";
const INCORRECT_CLAIMS: &str = "incorrect claims, please check the audience and issuer";
const NO_ACCESS: &str = "You don't have access to this resource";

/// Internal failures that never reach the caller verbatim.
///
/// These are logged with full detail and collapsed into a generic [`AuthError`] before a response is written.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to fetch JWK set")]
    FailedJwkSetRequest(#[from] reqwest::Error),
    #[error("received error response when fetching JWK set: {status_code}")]
    JwkSetRequestErrorResponse { status_code: StatusCode },
    #[error("JWK set fetch task did not complete")]
    JwkSetFetchAborted(#[source] tokio::task::JoinError),
}

/// Caller-facing authentication or authorization failure.
///
/// Carries a stable `code`, a deliberately generic `description` and the HTTP status the boundary responds with.
/// It never contains token material.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {description}")]
pub struct AuthError {
    code: &'static str,
    description: &'static str,
    status: StatusCode,
}

impl AuthError {
    const fn new(code: &'static str, description: &'static str, status: StatusCode) -> Self {
        Self {
            code,
            description,
            status,
        }
    }

    pub const fn header_missing() -> Self {
        Self::new(
            "authorization_header_missing",
            HEADER_EXPECTED,
            StatusCode::UNAUTHORIZED,
        )
    }

    pub const fn invalid_header(description: &'static str) -> Self {
        Self::new("invalid_header", description, StatusCode::UNAUTHORIZED)
    }

    /// Shared by every header, key-fetch and signature failure so callers can't tell them apart.
    pub const fn unparseable_token() -> Self {
        Self::invalid_header(UNPARSEABLE_TOKEN)
    }

    pub const fn no_matching_key() -> Self {
        Self::invalid_header(NO_MATCHING_KEY)
    }

    pub const fn token_expired() -> Self {
        Self::new("token_expired", TOKEN_EXPIRED, StatusCode::UNAUTHORIZED)
    }

    pub const fn invalid_claims() -> Self {
        Self::new("invalid_claims", INCORRECT_CLAIMS, StatusCode::UNAUTHORIZED)
    }

    /// The caller is authenticated but lacks the scope the resource requires.
    pub const fn forbidden() -> Self {
        Self::new("Unauthorized", NO_ACCESS, StatusCode::FORBIDDEN)
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "code": self.code,
            "description": self.description,
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod test {
    use axum::body::to_bytes;
    use axum::response::IntoResponse;
    use http::StatusCode;

    use super::AuthError;

    #[tokio::test]
    async fn test_response_carries_status_and_body() {
        let response = AuthError::token_expired().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
            serde_json::json!({"code": "token_expired", "description": "token is expired"})
        );
    }

    #[test]
    fn test_forbidden_is_distinct_from_authentication_failures() {
        let forbidden = AuthError::forbidden();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(forbidden.code(), "Unauthorized");
        assert_eq!(
            AuthError::no_matching_key().code(),
            AuthError::unparseable_token().code()
        );
    }
}
