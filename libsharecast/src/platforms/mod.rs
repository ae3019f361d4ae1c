//! Platform abstraction and implementations
//!
//! Every supported network is one implementation of [`Platform`], which
//! bundles the two per-platform capabilities Sharecast needs:
//!
//! - the OAuth token exchange (authorization URL, code exchange, profile
//!   lookup and, where the vendor offers it, refresh), and
//! - the media upload sequence that turns an [`UploadRequest`] into a
//!   published post.
//!
//! The dispatch loop is written once against the trait.
//!
//! # Examples
//!
//! ```no_run
//! use libsharecast::config::PlatformConfig;
//! use libsharecast::platforms::{youtube::YouTubePlatform, Platform};
//! use libsharecast::types::{PlatformConnection, PlatformKind, UploadRequest};
//!
//! # async fn example() -> libsharecast::error::Result<()> {
//! let config = PlatformConfig::new("client-id", "client-secret", "https://example.com/cb");
//! let platform = YouTubePlatform::new(config, reqwest::Client::new(), 1024 * 1024);
//!
//! let connection = PlatformConnection::new(PlatformKind::YouTube, "ya29.token", "My Channel");
//! let request = UploadRequest::new(vec![0u8; 4096], "video/mp4", "Launch day");
//!
//! let result = platform.upload(&connection, &request).await?;
//! println!("Published at {}", result.post_url);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::config::PlatformConfig;
use crate::error::{ConfigError, PlatformError, Result};
use crate::http;
use crate::oauth::AuthorizationGrant;
use crate::types::{MediaKind, PlatformConnection, PlatformKind, UploadRequest, UploadResult};

pub mod facebook;
pub mod instagram;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

// Available outside tests so the server and CLI integration tests can use it
pub mod mock;

/// Capability trait implemented once per platform
///
/// Implementations hold their own HTTP client and endpoint configuration and
/// are shared across requests behind an `Arc`, so every method takes `&self`.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Which platform this is
    fn kind(&self) -> PlatformKind;

    /// Whether client credentials are present and the platform is enabled
    fn is_configured(&self) -> bool;

    /// Media kinds this platform can publish
    fn supported_media(&self) -> &[MediaKind];

    /// Whether the platform accepts a future publish time
    fn supports_scheduling(&self) -> bool {
        false
    }

    /// Whether the authorization flow needs a PKCE challenge
    fn requires_pkce(&self) -> bool {
        false
    }

    /// Build the consent URL the user is sent to
    ///
    /// `code_challenge` is the S256 PKCE challenge; platforms that do not use
    /// PKCE ignore it.
    fn authorization_url(&self, state: &str, code_challenge: Option<&str>) -> Result<String>;

    /// Exchange an authorization code for tokens and fetch the profile
    ///
    /// # Errors
    ///
    /// - `PlatformError::Authentication` if the vendor rejects the code or
    ///   the response carries no access token
    /// - `PlatformError::Api` / `Network` for other vendor or transport failures
    async fn exchange_token(&self, grant: &AuthorizationGrant) -> Result<PlatformConnection>;

    /// Obtain a fresh access token with the connection's refresh token
    ///
    /// Platforms without refresh tokens keep this default, which asks the
    /// user to reconnect.
    async fn refresh_connection(&self, _connection: &PlatformConnection) -> Result<PlatformConnection> {
        Err(PlatformError::Authentication(format!(
            "{} connections cannot be refreshed. Suggestion: Reconnect your {} account.",
            self.kind().display_name(),
            self.kind().display_name()
        ))
        .into())
    }

    /// Check a request against common and platform-specific rules
    ///
    /// Runs without any network access. Implementations that add limits
    /// should call [`check_request`] first.
    fn validate_request(&self, request: &UploadRequest) -> Result<()> {
        check_request(self, request)
    }

    /// Publish the request's media to the connected account
    ///
    /// Implementations call [`Platform::validate_request`] before their first
    /// network call and propagate the first error of their request sequence.
    async fn upload(&self, connection: &PlatformConnection, request: &UploadRequest) -> Result<UploadResult>;
}

/// Rules shared by every platform
///
/// - required fields present (file, mime type, title)
/// - media kind supported by the platform
/// - a schedule only where the platform supports one
pub fn check_request<P: Platform + ?Sized>(platform: &P, request: &UploadRequest) -> Result<()> {
    request.validate()?;

    let name = platform.kind().display_name();

    if !platform.supported_media().contains(&request.media_kind) {
        return Err(PlatformError::Validation(format!(
            "{} does not support {} uploads",
            name, request.media_kind
        ))
        .into());
    }

    if request.scheduled_time.is_some() && !platform.supports_scheduling() {
        return Err(PlatformError::Validation(format!(
            "{} does not support scheduled publishing",
            name
        ))
        .into());
    }

    Ok(())
}

/// Reject text longer than a platform limit (counted in characters)
pub(crate) fn check_length(platform: PlatformKind, field: &str, text: &str, limit: usize) -> Result<()> {
    let count = text.chars().count();
    if count > limit {
        return Err(PlatformError::Validation(format!(
            "{} {} exceeds {} characters ({} characters)",
            platform.display_name(),
            field,
            limit,
            count
        ))
        .into());
    }
    Ok(())
}

/// Vendor default hosts for one platform
#[derive(Debug, Clone, Copy)]
pub(crate) struct EndpointDefaults {
    pub api: &'static str,
    /// Token endpoint host
    pub oauth: &'static str,
    pub upload: &'static str,
    /// Consent page host, often different from the token host
    pub authorize: &'static str,
}

/// Resolved endpoint bases for one platform
///
/// An `oauth_base` override applies to both the consent page and the token
/// endpoint.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    pub api: String,
    pub oauth: String,
    pub upload: String,
    pub authorize: String,
}

impl Endpoints {
    pub fn resolve(config: &PlatformConfig, defaults: &EndpointDefaults) -> Self {
        Self {
            api: config.api_base.clone().unwrap_or_else(|| defaults.api.to_string()),
            oauth: config.oauth_base.clone().unwrap_or_else(|| defaults.oauth.to_string()),
            upload: config.upload_base.clone().unwrap_or_else(|| defaults.upload.to_string()),
            authorize: config.oauth_base.clone().unwrap_or_else(|| defaults.authorize.to_string()),
        }
    }
}

/// `base` + `path` with query parameters appended
pub(crate) fn url_with_params(
    platform: PlatformKind,
    base: &str,
    path: &str,
    params: &[(&str, &str)],
) -> Result<String> {
    let joined = http::join_url(base, path);
    reqwest::Url::parse_with_params(&joined, params)
        .map(|url| url.to_string())
        .map_err(|e| {
            ConfigError::InvalidValue {
                field: format!("{}.oauth_base", platform),
                reason: format!("'{}' is not a valid URL: {}", joined, e),
            }
            .into()
        })
}

/// Shared `is_configured` rule for OAuth client platforms
pub(crate) fn client_configured(config: &PlatformConfig) -> bool {
    config.enabled && config.is_complete() && config.has_secret()
}
