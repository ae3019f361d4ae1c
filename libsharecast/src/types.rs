//! Core types for Sharecast

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result, SharecastError};

/// A supported third-party platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    TikTok,
    YouTube,
    Instagram,
    Facebook,
    Twitter,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 5] = [
        PlatformKind::TikTok,
        PlatformKind::YouTube,
        PlatformKind::Instagram,
        PlatformKind::Facebook,
        PlatformKind::Twitter,
    ];

    /// Lowercase identifier used in requests, results and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::TikTok => "tiktok",
            PlatformKind::YouTube => "youtube",
            PlatformKind::Instagram => "instagram",
            PlatformKind::Facebook => "facebook",
            PlatformKind::Twitter => "twitter",
        }
    }

    /// Human-readable name for messages
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformKind::TikTok => "TikTok",
            PlatformKind::YouTube => "YouTube",
            PlatformKind::Instagram => "Instagram",
            PlatformKind::Facebook => "Facebook",
            PlatformKind::Twitter => "Twitter",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = SharecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tiktok" => Ok(PlatformKind::TikTok),
            "youtube" => Ok(PlatformKind::YouTube),
            "instagram" => Ok(PlatformKind::Instagram),
            "facebook" => Ok(PlatformKind::Facebook),
            "twitter" | "x" => Ok(PlatformKind::Twitter),
            other => Err(SharecastError::InvalidInput(format!(
                "Unknown platform: '{}'. Valid options: tiktok, youtube, instagram, facebook, twitter",
                other
            ))),
        }
    }
}

/// Who can see the published post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Unlisted,
    Friends,
}

impl FromStr for Visibility {
    type Err = SharecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "unlisted" => Ok(Visibility::Unlisted),
            "friends" | "friends_only" | "mutual" => Ok(Visibility::Friends),
            other => Err(SharecastError::InvalidInput(format!(
                "Invalid visibility: '{}'. Valid options: public, private, unlisted, friends",
                other
            ))),
        }
    }
}

/// Kind of media being shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Derive the media kind from a MIME string (e.g. "video/mp4")
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_lowercase();
        if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else if mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = SharecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "video" | "short" | "reel" | "reels" => Ok(MediaKind::Video),
            "image" | "photo" | "picture" => Ok(MediaKind::Image),
            other => Err(SharecastError::InvalidInput(format!(
                "Invalid media type: '{}'. Valid options: video, image",
                other
            ))),
        }
    }
}

/// Stored OAuth connection between a user and a platform account
///
/// Created on a successful code exchange, replaced on refresh and removed on
/// disconnect. Tokens never appear in `Debug` output.
#[derive(Debug, Clone)]
pub struct PlatformConnection {
    pub platform: PlatformKind,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Platform-side user or page id (required by graph-style APIs)
    pub account_id: Option<String>,
    pub username: String,
    pub profile_picture_url: Option<String>,
    pub scopes: Vec<String>,
}

impl PlatformConnection {
    pub fn new(platform: PlatformKind, access_token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            platform,
            access_token: SecretString::from(access_token.into()),
            refresh_token: None,
            expires_at: None,
            account_id: None,
            username: username.into(),
            profile_picture_url: None,
            scopes: Vec::new(),
        }
    }

    /// A connection without an expiry never expires
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// `Authorization` header value for bearer-token APIs
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }

    /// Graph-style account id, or `me` when the platform did not return one
    pub fn account_or_me(&self) -> &str {
        self.account_id.as_deref().unwrap_or("me")
    }

    pub fn summary(&self, now: DateTime<Utc>) -> ConnectionSummary {
        ConnectionSummary {
            platform: self.platform,
            username: self.username.clone(),
            account_id: self.account_id.clone(),
            profile_picture_url: self.profile_picture_url.clone(),
            expires_at: self.expires_at,
            expired: self.is_expired(now),
            has_refresh_token: self.refresh_token.is_some(),
            scopes: self.scopes.clone(),
        }
    }
}

/// Token-free view of a connection, safe to print or return over HTTP
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub platform: PlatformKind,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub has_refresh_token: bool,
    pub scopes: Vec<String>,
}

/// Optional cover image for platforms that accept one
#[derive(Clone)]
pub struct Thumbnail {
    pub data: Bytes,
    pub mime_type: String,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// One share action's media and metadata
///
/// Built per request and dropped afterwards; only outcomes are recorded.
#[derive(Clone)]
pub struct UploadRequest {
    pub file: Bytes,
    pub file_name: Option<String>,
    pub mime_type: String,
    pub media_kind: MediaKind,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    /// Publicly reachable copy of the file, used by URL-pull APIs
    pub source_url: Option<String>,
    pub thumbnail: Option<Thumbnail>,
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("bytes", &self.file.len())
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("media_kind", &self.media_kind)
            .field("title", &self.title)
            .field("tags", &self.tags)
            .field("visibility", &self.visibility)
            .field("scheduled_time", &self.scheduled_time)
            .finish_non_exhaustive()
    }
}

impl UploadRequest {
    /// Create a request with default metadata; media kind follows the MIME type
    pub fn new(file: impl Into<Bytes>, mime_type: impl Into<String>, title: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let media_kind = MediaKind::from_mime(&mime_type).unwrap_or(MediaKind::Video);
        Self {
            file: file.into(),
            file_name: None,
            mime_type,
            media_kind,
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            visibility: Visibility::default(),
            scheduled_time: None,
            location: None,
            source_url: None,
            thumbnail: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.file.len() as u64
    }

    /// Check the fields every platform requires
    pub fn validate(&self) -> Result<()> {
        self.validate_at(Utc::now())
    }

    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<()> {
        if self.file.is_empty() {
            return Err(PlatformError::Validation("file is required".to_string()).into());
        }

        if self.mime_type.trim().is_empty() {
            return Err(PlatformError::Validation("mime type is required".to_string()).into());
        }

        if self.title.trim().is_empty() {
            return Err(PlatformError::Validation("title is required".to_string()).into());
        }

        if MediaKind::from_mime(&self.mime_type) != Some(self.media_kind) {
            return Err(PlatformError::Validation(format!(
                "mime type '{}' does not match media type '{}'",
                self.mime_type, self.media_kind
            ))
            .into());
        }

        if let Some(scheduled) = self.scheduled_time {
            if scheduled <= now {
                return Err(PlatformError::Validation(
                    "scheduled time must be in the future".to_string(),
                )
                .into());
            }
        }

        Ok(())
    }

    /// Hashtags derived from tags (`#tag`, whitespace removed, empties dropped)
    pub fn hashtags(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| tag.trim().trim_start_matches('#').split_whitespace().collect::<String>())
            .filter(|tag| !tag.is_empty())
            .map(|tag| format!("#{}", tag))
            .collect()
    }

    /// Single-text caption: title, description, then hashtags
    pub fn caption(&self) -> String {
        let mut parts = vec![self.title.trim().to_string()];

        if !self.description.trim().is_empty() {
            parts.push(self.description.trim().to_string());
        }

        let hashtags = self.hashtags();
        if !hashtags.is_empty() {
            parts.push(hashtags.join(" "));
        }

        parts.join("\n\n")
    }
}

/// Successful publication on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub post_id: String,
    pub post_url: String,
}

/// Per-platform entry of a share's result map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlatformOutcome {
    #[serde(rename_all = "camelCase")]
    Posted { post_id: String, post_url: String },
    Failed { error: String },
}

impl PlatformOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PlatformOutcome::Posted { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PlatformOutcome::Failed { error } => Some(error),
            PlatformOutcome::Posted { .. } => None,
        }
    }
}

impl From<Result<UploadResult>> for PlatformOutcome {
    fn from(result: Result<UploadResult>) -> Self {
        match result {
            Ok(UploadResult { post_id, post_url }) => PlatformOutcome::Posted { post_id, post_url },
            Err(e) => PlatformOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Results keyed by platform, ordered for stable output
pub type ShareResults = BTreeMap<PlatformKind, PlatformOutcome>;
