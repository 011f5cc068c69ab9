//! Extraction of bearer tokens from the `Authorization` header.

use http::HeaderValue;

use crate::AuthError;

const MUST_START_WITH_BEARER: &str = "Authorization header must start with Bearer";
const TOKEN_NOT_FOUND: &str = "Token not found";
const MUST_BE_BEARER_TOKEN: &str = "Authorization header must be Bearer token";

/// Parses the raw `Authorization` header value into the bearer token it carries.
///
/// The scheme is compared case-insensitively and the token is returned verbatim. Each malformed shape maps to its own
/// [`AuthError`] description.
pub fn extract_bearer(header: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let header = match header {
        Some(header) if !header.is_empty() => header,
        _ => return Err(AuthError::header_missing()),
    };
    let value = header
        .to_str()
        .map_err(|_| AuthError::invalid_header(MUST_START_WITH_BEARER))?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), _, _) if !scheme.eq_ignore_ascii_case("bearer") => {
            Err(AuthError::invalid_header(MUST_START_WITH_BEARER))
        }
        (None, _, _) => Err(AuthError::invalid_header(MUST_START_WITH_BEARER)),
        (Some(_), None, _) => Err(AuthError::invalid_header(TOKEN_NOT_FOUND)),
        (Some(_), Some(_), Some(_)) => Err(AuthError::invalid_header(MUST_BE_BEARER_TOKEN)),
        (Some(_), Some(token), None) => Ok(token),
    }
}
