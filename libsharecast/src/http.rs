//! Shared HTTP plumbing for platform clients
//!
//! Every vendor call goes through [`send`] and [`check_response`] so that
//! transport failures and non-success statuses map onto [`PlatformError`]
//! the same way for all platforms.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::HttpConfig;
use crate::error::{PlatformError, Result};
use crate::types::PlatformKind;

const DEFAULT_USER_AGENT: &str = concat!("sharecast/", env!("CARGO_PKG_VERSION"));

/// Longest vendor message carried into an error
const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client shared by all platform clients
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(
        config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
    );

    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    builder
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Send a request, mapping transport failures to `PlatformError::Network`
pub(crate) async fn send(
    request: RequestBuilder,
    platform: PlatformKind,
    context: &str,
) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(e, platform, context))?;

    check_response(response, platform, context).await
}

/// Send a request and decode a JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    platform: PlatformKind,
    context: &str,
) -> Result<T> {
    let response = send(request, platform, context).await?;
    read_json(response, platform, context).await
}

/// Pass through success responses, map everything else to a platform error
pub(crate) async fn check_response(
    response: Response,
    platform: PlatformKind,
    context: &str,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(map_status(status, &body, platform, context).into())
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    platform: PlatformKind,
    context: &str,
) -> Result<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| map_transport_error(e, platform, context))?;

    serde_json::from_slice(&body).map_err(|e| {
        PlatformError::Api(format!(
            "{} response parse error ({}): {}",
            platform.display_name(),
            context,
            e
        ))
        .into()
    })
}

/// Map a non-success HTTP status and body to a platform error
///
/// - 401/403 → `Authentication`
/// - 429 → `RateLimit`
/// - anything else → `Api`, vendor message passed through
pub fn map_status(status: StatusCode, body: &str, platform: PlatformKind, context: &str) -> PlatformError {
    let message = vendor_message(body);
    let name = platform.display_name();

    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(format!(
            "{} authentication failed ({}): HTTP {}: {}. \
             Suggestion: Reconnect your {} account.",
            name,
            context,
            status.as_u16(),
            message,
            name
        )),
        429 => PlatformError::RateLimit(format!(
            "{} rate limit exceeded ({}): {}",
            name, context, message
        )),
        code => PlatformError::Api(format!(
            "{} API error ({}): HTTP {}: {}",
            name, context, code, message
        )),
    }
}

fn map_transport_error(error: reqwest::Error, platform: PlatformKind, context: &str) -> crate::error::SharecastError {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };

    PlatformError::Network(format!(
        "{} {} ({}): {}",
        platform.display_name(),
        kind,
        context,
        error
    ))
    .into()
}

/// Best human-readable message from a vendor error body
///
/// Looks for the common JSON shapes (`error.message`, `error_description`,
/// `error` as a string, `message`, `detail`) and falls back to the raw body.
pub fn vendor_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let candidates = [
            json.pointer("/error/message"),
            json.get("error_description"),
            json.get("error").filter(|v| v.is_string()),
            json.get("message"),
            json.get("detail"),
            json.pointer("/errors/0/message"),
        ];

        if let Some(message) = candidates.into_iter().flatten().find_map(|v| v.as_str()) {
            return truncate(message);
        }
    }

    truncate(trimmed)
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_BODY {
        message.to_string()
    } else {
        let cut: String = message.chars().take(MAX_ERROR_BODY).collect();
        format!("{}…", cut)
    }
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_message_graph_shape() {
        let body = r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#;
        assert_eq!(vendor_message(body), "Invalid OAuth access token.");
    }

    #[test]
    fn test_vendor_message_oauth_shape() {
        let body = r#"{"error":"invalid_grant","error_description":"Bad Request"}"#;
        assert_eq!(vendor_message(body), "Bad Request");
    }

    #[test]
    fn test_vendor_message_plain_error_string() {
        assert_eq!(vendor_message(r#"{"error":"invalid_client"}"#), "invalid_client");
    }

    #[test]
    fn test_vendor_message_twitter_shape() {
        let body = r#"{"title":"Unauthorized","detail":"Unauthorized","type":"about:blank","status":401}"#;
        assert_eq!(vendor_message(body), "Unauthorized");
    }

    #[test]
    fn test_vendor_message_raw_body() {
        assert_eq!(vendor_message("  upstream exploded  "), "upstream exploded");
        assert_eq!(vendor_message(""), "empty response body");
    }

    #[test]
    fn test_vendor_message_truncates() {
        let long = "x".repeat(2000);
        let message = vendor_message(&long);
        assert_eq!(message.chars().count(), MAX_ERROR_BODY + 1);
        assert!(message.ends_with('…'));
    }

    #[test]
    fn test_map_status_authentication() {
        let error = map_status(StatusCode::UNAUTHORIZED, "{}", PlatformKind::YouTube, "upload");
        assert!(matches!(error, PlatformError::Authentication(_)));
        assert!(error.to_string().contains("YouTube authentication failed (upload)"));

        let error = map_status(StatusCode::FORBIDDEN, "", PlatformKind::TikTok, "init");
        assert!(matches!(error, PlatformError::Authentication(_)));
    }

    #[test]
    fn test_map_status_rate_limit() {
        let error = map_status(StatusCode::TOO_MANY_REQUESTS, "slow down", PlatformKind::Twitter, "tweet");
        assert!(matches!(error, PlatformError::RateLimit(_)));
    }

    #[test]
    fn test_map_status_passes_vendor_message_through() {
        let body = r#"{"error":{"message":"(#100) Invalid parameter"}}"#;
        let error = map_status(StatusCode::BAD_REQUEST, body, PlatformKind::Facebook, "finish upload");
        assert!(matches!(error, PlatformError::Api(_)));
        assert_eq!(
            error.to_string(),
            "Vendor API error: Facebook API error (finish upload): HTTP 400: (#100) Invalid parameter"
        );
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://a.example/", "/v2/x"), "https://a.example/v2/x");
        assert_eq!(join_url("https://a.example", "v2/x"), "https://a.example/v2/x");
    }

    #[test]
    fn test_build_client_with_timeout() {
        let config = HttpConfig {
            timeout_secs: Some(5),
            user_agent: Some("test-agent".to_string()),
        };
        assert!(build_client(&config).is_ok());
        assert!(build_client(&HttpConfig::default()).is_ok());
    }
}
