//! Error types for Sharecast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SharecastError>;

#[derive(Error, Debug)]
pub enum SharecastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SharecastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SharecastError::InvalidInput(_) => 3,
            SharecastError::Platform(PlatformError::Validation(_)) => 3,
            SharecastError::Platform(PlatformError::Authentication(_)) => 2,
            SharecastError::Platform(_) => 1,
            SharecastError::Config(_) => 1,
            SharecastError::Database(_) => 1,
        }
    }

    /// True for errors the caller caused (malformed or incomplete request)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SharecastError::InvalidInput(_) | SharecastError::Platform(PlatformError::Validation(_))
        )
    }

    /// True for missing, invalid or expired credentials
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            SharecastError::Platform(PlatformError::Authentication(_))
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Vendor API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = SharecastError::InvalidInput("file is required".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_validation_matches_invalid_input() {
        let error = SharecastError::Platform(PlatformError::Validation(
            "title is required".to_string(),
        ));
        assert_eq!(error.exit_code(), 3);
        assert!(error.is_validation());
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = SharecastError::Platform(PlatformError::Authentication(
            "token expired".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
        assert!(error.is_authentication());
    }

    #[test]
    fn test_exit_code_vendor_errors() {
        for platform_error in [
            PlatformError::Api("HTTP 500".to_string()),
            PlatformError::Network("connection refused".to_string()),
            PlatformError::RateLimit("slow down".to_string()),
        ] {
            let error = SharecastError::Platform(platform_error);
            assert_eq!(error.exit_code(), 1);
            assert!(!error.is_validation());
            assert!(!error.is_authentication());
        }
    }

    #[test]
    fn test_exit_code_config_and_database() {
        let config = SharecastError::Config(ConfigError::MissingField("database.path".into()));
        assert_eq!(config.exit_code(), 1);

        let db = SharecastError::Database(DbError::CorruptRow("bad platform".into()));
        assert_eq!(db.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = SharecastError::Platform(PlatformError::Api(
            "TikTok API error (init upload): HTTP 400: spam_risk_too_many_posts".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Vendor API error: TikTok API error (init upload): HTTP 400: spam_risk_too_many_posts"
        );

        let error = SharecastError::InvalidInput("file is required".to_string());
        assert_eq!(error.to_string(), "Invalid input: file is required");
    }

    #[test]
    fn test_invalid_value_formatting() {
        let error = ConfigError::InvalidValue {
            field: "upload.chunk_size".to_string(),
            reason: "must be greater than zero".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value for upload.chunk_size: must be greater than zero"
        );
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let converted: SharecastError = PlatformError::Network("timeout".to_string()).into();
        assert!(matches!(
            converted,
            SharecastError::Platform(PlatformError::Network(_))
        ));
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::RateLimit("Too many requests".to_string());
        let cloned = original.clone();
        assert_eq!(original.to_string(), cloned.to_string());
    }
}
