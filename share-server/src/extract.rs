//! Request extractors

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

/// Header carrying the authenticated user's id
///
/// Set by the session layer in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user a request acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| UserId(value.to_string()))
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", USER_ID_HEADER)))
    }
}
