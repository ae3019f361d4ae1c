//! OAuth helpers shared by the platform exchangers
//!
//! Covers PKCE pairs, CSRF `state` values, the pending-authorization table
//! that ties a callback back to the user who started it, and the common
//! token endpoint response.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::{PlatformError, Result};
use crate::types::PlatformKind;

/// How long a started authorization stays valid
pub const PENDING_TTL_MINUTES: i64 = 10;

const VERIFIER_LEN: usize = 64;
const STATE_LEN: usize = 32;

/// Authorization code returned to the redirect URI
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    pub code: String,
    /// PKCE verifier, required by platforms that use PKCE
    pub code_verifier: Option<String>,
}

impl AuthorizationGrant {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            code_verifier: None,
        }
    }

    pub fn with_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.code_verifier = Some(verifier.into());
        self
    }
}

/// PKCE verifier/challenge pair (method `S256`)
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        Self::from_verifier(random_token(VERIFIER_LEN))
    }

    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = pkce_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// base64url-no-pad(SHA-256(verifier))
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random CSRF state for an authorization URL
pub fn generate_state() -> String {
    random_token(STATE_LEN)
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Expiry instant from a relative `expires_in` (seconds)
pub fn expires_at_from(expires_in: Option<i64>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    expires_in
        .filter(|secs| *secs > 0)
        .map(|secs| now + Duration::seconds(secs))
}

/// Standard OAuth 2.0 token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// The access token, or an authentication error when the vendor omitted it
    pub fn require_access_token(&self, platform: PlatformKind) -> Result<String> {
        self.access_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                PlatformError::Authentication(format!(
                    "{} token response did not include an access token",
                    platform.display_name()
                ))
                .into()
            })
    }

    /// Granted scopes, split on commas or spaces
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split([',', ' '])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// An authorization started by a user and not yet completed
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub user_id: String,
    pub platform: PlatformKind,
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::minutes(PENDING_TTL_MINUTES)
    }
}

/// In-memory `state -> pending authorization` table
#[derive(Debug, Clone, Default)]
pub struct PendingAuthorizations {
    inner: Arc<RwLock<HashMap<String, PendingAuthorization>>>,
}

impl PendingAuthorizations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a started authorization under `state`
    ///
    /// Expired entries are pruned on every insert.
    pub async fn insert(&self, state: impl Into<String>, pending: PendingAuthorization) {
        let now = Utc::now();
        let mut table = self.inner.write().await;
        table.retain(|_, entry| !entry.is_expired(now));
        table.insert(state.into(), pending);
    }

    /// Remove and return the authorization for `state`
    ///
    /// Unknown, expired, or other-platform states are authentication errors.
    /// A state issued for another platform stays pending; an expired one is
    /// dropped.
    pub async fn take(&self, state: &str, platform: PlatformKind) -> Result<PendingAuthorization> {
        self.take_at(state, platform, Utc::now()).await
    }

    pub async fn take_at(
        &self,
        state: &str,
        platform: PlatformKind,
        now: DateTime<Utc>,
    ) -> Result<PendingAuthorization> {
        let mut table = self.inner.write().await;
        let issued_for = table
            .get(state)
            .map(|pending| pending.platform)
            .ok_or_else(|| {
                PlatformError::Authentication("Unknown or already used OAuth state".to_string())
            })?;

        if issued_for != platform {
            return Err(PlatformError::Authentication(format!(
                "OAuth state was issued for {}, not {}",
                issued_for, platform
            ))
            .into());
        }

        match table.remove(state) {
            Some(pending) if !pending.is_expired(now) => Ok(pending),
            _ => Err(PlatformError::Authentication(format!(
                "OAuth state expired; start the {} connection again",
                platform.display_name()
            ))
            .into()),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(platform: PlatformKind, created_at: DateTime<Utc>) -> PendingAuthorization {
        PendingAuthorization {
            user_id: "alice".to_string(),
            platform,
            code_verifier: None,
            created_at,
        }
    }

    #[test]
    fn test_pkce_rfc7636_vector() {
        // Appendix B of RFC 7636
        let pair = PkcePair::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(pair.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_pkce_generate() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), VERIFIER_LEN);
        assert!(pair.verifier.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(pair.challenge, pkce_challenge(&pair.verifier));
        assert!(!pair.challenge.contains('='));
    }

    #[test]
    fn test_generate_state_is_random() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), STATE_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_expires_at_from() {
        let now = Utc::now();
        assert_eq!(expires_at_from(Some(3600), now), Some(now + Duration::hours(1)));
        assert_eq!(expires_at_from(Some(0), now), None);
        assert_eq!(expires_at_from(None, now), None);
    }

    #[test]
    fn test_token_response_scopes_and_missing_token() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"","scope":"user.info.basic,video.publish video.upload"}"#,
        )
        .unwrap();

        assert_eq!(
            response.scopes(),
            vec!["user.info.basic", "video.publish", "video.upload"]
        );
        let err = response.require_access_token(PlatformKind::TikTok).unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_pending_take_consumes_state() {
        let table = PendingAuthorizations::new();
        table
            .insert("state-1", pending(PlatformKind::Twitter, Utc::now()))
            .await;

        let taken = table.take("state-1", PlatformKind::Twitter).await.unwrap();
        assert_eq!(taken.user_id, "alice");
        assert!(table.is_empty().await);

        let err = table.take("state-1", PlatformKind::Twitter).await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_pending_expired_state_rejected() {
        let table = PendingAuthorizations::new();
        let created = Utc::now();
        table.insert("old", pending(PlatformKind::YouTube, created)).await;

        let later = created + Duration::minutes(PENDING_TTL_MINUTES + 1);
        let err = table
            .take_at("old", PlatformKind::YouTube, later)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn test_pending_platform_mismatch_rejected() {
        let table = PendingAuthorizations::new();
        table.insert("s", pending(PlatformKind::TikTok, Utc::now())).await;

        let err = table.take("s", PlatformKind::Facebook).await.unwrap_err();
        assert!(err.is_authentication());

        // The state still belongs to the TikTok flow
        let taken = table.take("s", PlatformKind::TikTok).await.unwrap();
        assert_eq!(taken.platform, PlatformKind::TikTok);
    }

    #[tokio::test]
    async fn test_insert_prunes_expired_entries() {
        let table = PendingAuthorizations::new();
        let stale = Utc::now() - Duration::minutes(PENDING_TTL_MINUTES * 2);
        table.insert("stale", pending(PlatformKind::TikTok, stale)).await;
        table.insert("fresh", pending(PlatformKind::TikTok, Utc::now())).await;

        assert_eq!(table.len().await, 1);
    }
}
