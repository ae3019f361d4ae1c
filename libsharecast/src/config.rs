//! Configuration management for Sharecast
//!
//! Platform credentials are read from the config file into one
//! [`PlatformConfig`] per platform and handed to the platform clients;
//! nothing reads client secrets from the process environment.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::chunking::DEFAULT_CHUNK_SIZE;
use crate::error::{ConfigError, Result};
use crate::types::{PlatformKind, Visibility};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    pub tiktok: Option<PlatformConfig>,
    pub youtube: Option<PlatformConfig>,
    pub instagram: Option<PlatformConfig>,
    pub facebook: Option<PlatformConfig>,
    pub twitter: Option<PlatformConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout; unset means the HTTP client's default
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub visibility: Visibility,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            platforms: Vec::new(),
            user: default_user(),
            visibility: Visibility::default(),
        }
    }
}

/// OAuth client settings and endpoint overrides for one platform
///
/// `api_base`, `oauth_base` and `upload_base` default to the vendor's public
/// endpoints; overriding them points a platform at another host.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub api_base: Option<String>,
    pub oauth_base: Option<String>,
    pub upload_base: Option<String>,
}

impl PlatformConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            enabled: true,
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            api_base: None,
            oauth_base: None,
            upload_base: None,
        }
    }

    /// Point every endpoint at one host
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = Some(base.clone());
        self.oauth_base = Some(base.clone());
        self.upload_base = Some(base);
        self
    }

    /// Client id and redirect URI are present
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.redirect_uri.trim().is_empty()
    }

    pub fn has_secret(&self) -> bool {
        !self.client_secret.expose_secret().is_empty()
    }

    /// Configured scopes, or the platform defaults when none are set
    pub fn scopes_or(&self, defaults: &[&str]) -> Vec<String> {
        if self.scopes.is_empty() {
            defaults.iter().map(|s| s.to_string()).collect()
        } else {
            self.scopes.clone()
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_user() -> String {
    "local".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration with no platforms and default paths
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/sharecast/sharecast.db".to_string(),
            },
            server: ServerConfig::default(),
            http: HttpConfig::default(),
            upload: UploadConfig::default(),
            defaults: DefaultsConfig::default(),
            tiktok: None,
            youtube: None,
            instagram: None,
            facebook: None,
            twitter: None,
        }
    }

    /// Settings for one platform, if present in the file
    pub fn platform(&self, kind: PlatformKind) -> Option<&PlatformConfig> {
        match kind {
            PlatformKind::TikTok => self.tiktok.as_ref(),
            PlatformKind::YouTube => self.youtube.as_ref(),
            PlatformKind::Instagram => self.instagram.as_ref(),
            PlatformKind::Facebook => self.facebook.as_ref(),
            PlatformKind::Twitter => self.twitter.as_ref(),
        }
    }

    pub fn set_platform(&mut self, kind: PlatformKind, platform: Option<PlatformConfig>) {
        let slot = match kind {
            PlatformKind::TikTok => &mut self.tiktok,
            PlatformKind::YouTube => &mut self.youtube,
            PlatformKind::Instagram => &mut self.instagram,
            PlatformKind::Facebook => &mut self.facebook,
            PlatformKind::Twitter => &mut self.twitter,
        };
        *slot = platform;
    }

    /// Platforms present and enabled, in canonical order
    pub fn enabled_platforms(&self) -> Vec<PlatformKind> {
        PlatformKind::ALL
            .into_iter()
            .filter(|kind| self.platform(*kind).is_some_and(|p| p.enabled))
            .collect()
    }

    /// Default share targets from `[defaults] platforms`
    pub fn default_platforms(&self) -> Result<Vec<PlatformKind>> {
        self.defaults
            .platforms
            .iter()
            .map(|name| name.parse())
            .collect()
    }

    /// Check values serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }

        if self.upload.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upload.chunk_size".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        for kind in PlatformKind::ALL {
            let Some(platform) = self.platform(kind) else {
                continue;
            };
            if !platform.enabled {
                continue;
            }
            if platform.client_id.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("{}.client_id", kind)).into());
            }
            if platform.redirect_uri.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("{}.redirect_uri", kind)).into());
            }
        }

        self.default_platforms()?;

        Ok(())
    }

    /// Database path with `~` and environment variables expanded
    pub fn database_path(&self) -> Result<String> {
        expand_path(&self.database.path)
    }
}

fn expand_path(path: &str) -> Result<String> {
    shellexpand::full(path)
        .map(|expanded| expanded.to_string())
        .map_err(|e| {
            ConfigError::InvalidValue {
                field: "path".to_string(),
                reason: format!("failed to expand '{}': {}", path, e),
            }
            .into()
        })
}

/// Resolve the configuration file path following XDG Base Directory conventions
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SHARECAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("sharecast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory conventions
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("sharecast"))
}
