//! Share form decoding
//!
//! The share endpoint and the `share-post` CLI both collect loosely typed
//! fields (multipart parts or command line flags) into [`ShareFields`] and
//! turn them into an [`UploadRequest`] here, so both front ends apply the
//! same parsing rules.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::dispatch::PlatformSelection;
use crate::error::{PlatformError, Result, SharecastError};
use crate::types::{MediaKind, Thumbnail, UploadRequest, Visibility};

const GENERIC_MIME: &str = "application/octet-stream";

/// Raw share fields before validation
#[derive(Debug, Clone, Default)]
pub struct ShareFields {
    pub file: Option<Bytes>,
    pub file_name: Option<String>,
    pub file_content_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// The `type` field: video, short, reel, image or photo
    pub media_type: Option<String>,
    /// JSON map of booleans
    pub platforms: Option<String>,
    /// JSON array or comma separated list
    pub tags: Option<String>,
    pub visibility: Option<String>,
    /// RFC 3339 timestamp
    pub scheduled_time: Option<String>,
    pub location: Option<String>,
    pub source_url: Option<String>,
    pub thumbnail: Option<Bytes>,
    pub thumbnail_content_type: Option<String>,
}

impl ShareFields {
    /// Store a text field by its form name; unknown names are ignored
    pub fn set_text(&mut self, name: &str, value: String) {
        let slot = match name {
            "title" => &mut self.title,
            "description" => &mut self.description,
            "type" => &mut self.media_type,
            "platforms" => &mut self.platforms,
            "tags" => &mut self.tags,
            "visibility" => &mut self.visibility,
            "scheduledTime" | "scheduled_time" => &mut self.scheduled_time,
            "location" => &mut self.location,
            "sourceUrl" | "source_url" => &mut self.source_url,
            other => {
                debug!("Ignoring unknown share field '{}'", other);
                return;
            }
        };
        *slot = Some(value);
    }

    /// Build the upload request and the optional platform selection
    ///
    /// `default_visibility` applies when the form has no `visibility`. The
    /// selection is `None` when the form has no `platforms` field.
    pub fn into_request(self, default_visibility: Visibility) -> Result<(UploadRequest, Option<PlatformSelection>)> {
        let file = self
            .file
            .filter(|data| !data.is_empty())
            .ok_or_else(|| PlatformError::Validation("file is required".to_string()))?;

        let declared_kind = non_empty(self.media_type).map(|t| t.parse::<MediaKind>()).transpose()?;

        let mime_type = detect_mime(&file, self.file_content_type.as_deref()).ok_or_else(|| {
            PlatformError::Validation(
                "could not determine the media type of the uploaded file".to_string(),
            )
        })?;
        let media_kind = match declared_kind {
            Some(kind) => kind,
            None => MediaKind::from_mime(&mime_type).ok_or_else(|| {
                PlatformError::Validation(format!("unsupported media type '{}'", mime_type))
            })?,
        };

        let mut request = UploadRequest::new(file, mime_type, self.title.unwrap_or_default());
        request.media_kind = media_kind;
        request.file_name = non_empty(self.file_name);
        request.description = self.description.unwrap_or_default();
        request.tags = match non_empty(self.tags) {
            Some(tags) => parse_tags(&tags)?,
            None => Vec::new(),
        };
        request.visibility = match non_empty(self.visibility) {
            Some(visibility) => visibility.parse()?,
            None => default_visibility,
        };
        request.scheduled_time = non_empty(self.scheduled_time)
            .map(|value| parse_scheduled_time(&value))
            .transpose()?;
        request.location = non_empty(self.location);
        request.source_url = non_empty(self.source_url);
        request.thumbnail = match self.thumbnail.filter(|data| !data.is_empty()) {
            Some(data) => {
                let mime_type = detect_mime(&data, self.thumbnail_content_type.as_deref())
                    .unwrap_or_else(|| GENERIC_MIME.to_string());
                Some(Thumbnail { data, mime_type })
            }
            None => None,
        };

        let selection = non_empty(self.platforms)
            .map(|json| PlatformSelection::parse(&json))
            .transpose()?;

        Ok((request, selection))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// MIME type of a media buffer
///
/// A specific declared `video/*` or `image/*` type wins; otherwise the type
/// is sniffed from the file's magic bytes.
pub fn detect_mime(data: &[u8], declared: Option<&str>) -> Option<String> {
    let declared = declared
        .map(|mime| mime.trim().to_lowercase())
        .filter(|mime| MediaKind::from_mime(mime).is_some());

    declared.or_else(|| infer::get(data).map(|kind| kind.mime_type().to_string()))
}

/// Tags from a JSON array (`["a","b"]`) or a comma separated list
pub fn parse_tags(value: &str) -> Result<Vec<String>> {
    let value = value.trim();
    let tags: Vec<String> = if value.starts_with('[') {
        serde_json::from_str(value).map_err(|e| {
            SharecastError::InvalidInput(format!("tags must be a JSON array of strings: {}", e))
        })?
    } else {
        value.split(',').map(str::to_string).collect()
    };

    Ok(tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect())
}

pub fn parse_scheduled_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| {
            SharecastError::InvalidInput(format!(
                "scheduledTime must be an RFC 3339 timestamp ('{}'): {}",
                value, e
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlatformKind;

    // Smallest byte prefixes infer recognizes
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const MP4: &[u8] = &[0, 0, 0, 0x18, b'f', b't', b'y', b'p', b'm', b'p', b'4', b'2', 0, 0, 0, 0];

    fn fields(file: &[u8]) -> ShareFields {
        let mut fields = ShareFields {
            file: Some(Bytes::copy_from_slice(file)),
            ..Default::default()
        };
        fields.set_text("title", "Launch".to_string());
        fields
    }

    #[test]
    fn test_detect_mime_prefers_specific_declared_type() {
        assert_eq!(detect_mime(PNG, Some("image/webp")).as_deref(), Some("image/webp"));
        assert_eq!(detect_mime(PNG, Some("application/octet-stream")).as_deref(), Some("image/png"));
        assert_eq!(detect_mime(MP4, None).as_deref(), Some("video/mp4"));
        assert_eq!(detect_mime(b"plain text", None), None);
    }

    #[test]
    fn test_parse_tags_forms() {
        assert_eq!(parse_tags(r#"["rust", " dev "]"#).unwrap(), vec!["rust", "dev"]);
        assert_eq!(parse_tags("rust, dev,,").unwrap(), vec!["rust", "dev"]);
        assert!(parse_tags("[1, 2]").unwrap_err().is_validation());
    }

    #[test]
    fn test_parse_scheduled_time() {
        let at = parse_scheduled_time("2030-01-01T10:00:00+02:00").unwrap();
        assert_eq!(at.to_rfc3339(), "2030-01-01T08:00:00+00:00");
        assert!(parse_scheduled_time("tomorrow").unwrap_err().is_validation());
    }

    #[test]
    fn test_into_request_full_form() {
        let mut fields = fields(MP4);
        fields.file_name = Some("clip.mp4".to_string());
        fields.set_text("description", "Body".to_string());
        fields.set_text("type", "reel".to_string());
        fields.set_text("platforms", r#"{"instagram": true, "tiktok": false}"#.to_string());
        fields.set_text("tags", "a,b".to_string());
        fields.set_text("visibility", "unlisted".to_string());
        fields.set_text("scheduledTime", "2030-01-01T00:00:00Z".to_string());
        fields.set_text("location", "12345".to_string());
        fields.set_text("sourceUrl", "https://cdn.example.com/clip.mp4".to_string());
        fields.set_text("unknown", "ignored".to_string());

        let (request, selection) = fields.into_request(Visibility::Public).unwrap();

        assert_eq!(request.mime_type, "video/mp4");
        assert_eq!(request.media_kind, MediaKind::Video);
        assert_eq!(request.file_name.as_deref(), Some("clip.mp4"));
        assert_eq!(request.tags, vec!["a", "b"]);
        assert_eq!(request.visibility, Visibility::Unlisted);
        assert!(request.scheduled_time.is_some());
        assert_eq!(request.location.as_deref(), Some("12345"));
        assert_eq!(
            selection.unwrap().enabled().unwrap(),
            vec![PlatformKind::Instagram]
        );
    }

    #[test]
    fn test_into_request_infers_kind_and_default_visibility() {
        let (request, selection) = fields(PNG).into_request(Visibility::Private).unwrap();
        assert_eq!(request.media_kind, MediaKind::Image);
        assert_eq!(request.visibility, Visibility::Private);
        assert!(selection.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_into_request_requires_file() {
        let mut fields = fields(PNG);
        fields.file = None;
        let err = fields.into_request(Visibility::Public).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("file is required"));
    }

    #[test]
    fn test_into_request_unknown_media() {
        let err = fields(b"not media at all").into_request(Visibility::Public).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_into_request_rejects_bad_fields() {
        let mut bad_type = fields(PNG);
        bad_type.set_text("type", "audio".to_string());
        assert!(bad_type.into_request(Visibility::Public).unwrap_err().is_validation());

        let mut bad_platforms = fields(PNG);
        bad_platforms.set_text("platforms", "youtube".to_string());
        assert!(bad_platforms.into_request(Visibility::Public).unwrap_err().is_validation());
    }

    #[test]
    fn test_declared_type_mismatch_fails_validation() {
        let mut fields = fields(PNG);
        fields.set_text("type", "video".to_string());
        let (request, _) = fields.into_request(Visibility::Public).unwrap();
        assert!(request.validate().unwrap_err().to_string().contains("does not match"));
    }

    #[test]
    fn test_thumbnail_is_attached() {
        let mut fields = fields(MP4);
        fields.thumbnail = Some(Bytes::from_static(PNG));
        let (request, _) = fields.into_request(Visibility::Public).unwrap();
        assert_eq!(request.thumbnail.unwrap().mime_type, "image/png");
    }
}
