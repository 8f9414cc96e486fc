//! Configuration file parser for ~/.config/tymax/config.toml.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`, which is enough for `--offline` browsing of a synced
//! mirror. Talking to Firestore needs at least `project_id`. Unknown keys are
//! accepted but logged, since they are usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::feed::{
    FeedSettings, HomeSettings, DEFAULT_HOME_CONCURRENCY, DEFAULT_PAGE_SIZE,
    DEFAULT_RELATED_LIMIT, DEFAULT_SECTION_SIZE,
};
use crate::store::FirestoreOptions;

/// Environment variable holding the API key. Takes precedence over the file.
pub const API_KEY_ENV: &str = "TYMAX_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level configuration.
///
/// Every key is optional. `api_key` is masked in `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Firestore project hosting the guide.
    pub project_id: String,

    /// Web API key (alternative to the TYMAX_API_KEY env var).
    pub api_key: Option<String>,

    /// API root. Overridable for emulators.
    pub base_url: String,

    pub database_id: String,

    pub channels_collection: String,
    pub categories_collection: String,

    /// Channels per category page.
    pub page_size: usize,

    /// Channels per home section.
    pub home_section_size: usize,

    /// Related channels on the detail screen.
    pub related_limit: usize,

    /// Home section queries in flight at once.
    pub home_concurrency: usize,

    pub request_timeout_secs: u64,
    pub max_retries: u32,

    /// Read from the local mirror instead of Firestore.
    pub offline: bool,

    /// Local mirror database. Defaults to `tymax.db` next to the config file.
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key: None,
            base_url: "https://firestore.googleapis.com".to_string(),
            database_id: "(default)".to_string(),
            channels_collection: "channels".to_string(),
            categories_collection: "categories".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            home_section_size: DEFAULT_SECTION_SIZE,
            related_limit: DEFAULT_RELATED_LIMIT,
            home_concurrency: DEFAULT_HOME_CONCURRENCY,
            request_timeout_secs: 30,
            max_retries: 3,
            offline: false,
            database_path: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("database_id", &self.database_id)
            .field("channels_collection", &self.channels_collection)
            .field("categories_collection", &self.categories_collection)
            .field("page_size", &self.page_size)
            .field("home_section_size", &self.home_section_size)
            .field("related_limit", &self.related_limit)
            .field("home_concurrency", &self.home_concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("offline", &self.offline)
            .field("database_path", &self.database_path)
            .finish()
    }
}

const KNOWN_KEYS: [&str; 14] = [
    "project_id",
    "api_key",
    "base_url",
    "database_id",
    "channels_collection",
    "categories_collection",
    "page_size",
    "home_section_size",
    "related_limit",
    "home_concurrency",
    "request_timeout_secs",
    "max_retries",
    "offline",
    "database_path",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load and validate configuration from a TOML file.
    ///
    /// - Missing or blank file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            project = %config.project_id,
            offline = config.offline,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the loaders cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("page_size", self.page_size),
            ("home_section_size", self.home_section_size),
            ("home_concurrency", self.home_concurrency),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be greater than zero"));
        }
        if self.channels_collection.is_empty() {
            return Err(invalid("channels_collection", "must not be empty"));
        }
        if self.categories_collection.is_empty() {
            return Err(invalid("categories_collection", "must not be empty"));
        }
        self.parsed_base_url()?;
        Ok(())
    }

    fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| invalid("base_url", e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid("base_url", format!("unsupported scheme: {other}"))),
        }
    }

    /// The API key, preferring the environment over the file.
    pub fn api_key(&self) -> Option<SecretString> {
        resolve_api_key(std::env::var(API_KEY_ENV).ok(), self.api_key.as_deref())
    }

    /// Firestore connection settings. Requires `project_id`.
    pub fn firestore_options(&self) -> Result<FirestoreOptions, ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(invalid(
                "project_id",
                "required unless running with --offline",
            ));
        }
        let mut options = FirestoreOptions::new(self.parsed_base_url()?, self.project_id.trim());
        options.database_id = self.database_id.clone();
        options.api_key = self.api_key();
        options.timeout = Duration::from_secs(self.request_timeout_secs);
        options.max_retries = self.max_retries;
        Ok(options)
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            collection: self.channels_collection.clone(),
            page_size: self.page_size,
        }
    }

    pub fn home_settings(&self) -> HomeSettings {
        HomeSettings {
            categories_collection: self.categories_collection.clone(),
            channels_collection: self.channels_collection.clone(),
            section_size: self.home_section_size,
            concurrency: self.home_concurrency,
        }
    }

    /// Mirror database location, relative paths resolved against `base_dir`
    /// (the directory holding the config file, see [`config_base_dir`]).
    pub fn database_path(&self, base_dir: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base_dir.join(path),
            None => base_dir.join("tymax.db"),
        }
    }
}

/// Directory that relative paths in the config file at `config_path` refer to.
pub fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Pick the env value when set and non-blank, else the file value.
fn resolve_api_key(env: Option<String>, file: Option<&str>) -> Option<SecretString> {
    env.filter(|key| !key.trim().is_empty())
        .or_else(|| file.filter(|key| !key.trim().is_empty()).map(str::to_string))
        .map(|key| SecretString::from(key.trim().to_string()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("tymax_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.home_section_size, 5);
        assert_eq!(config.related_limit, 5);
        assert_eq!(config.channels_collection, "channels");
        assert!(!config.offline);
        assert!(config.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/tymax_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.base_url, "https://firestore.googleapis.com");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "project_id = \"guide-prod\"\npage_size = 20\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.project_id, "guide-prod");
        assert_eq!(config.page_size, 20);
        assert_eq!(config.home_concurrency, DEFAULT_HOME_CONCURRENCY);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
project_id = "guide-prod"
api_key = "web-key"
base_url = "http://localhost:8080"
database_id = "guide"
channels_collection = "tv_channels"
categories_collection = "tv_categories"
page_size = 25
home_section_size = 8
related_limit = 3
home_concurrency = 2
request_timeout_secs = 10
max_retries = 1
offline = true
database_path = "cache/guide.db"
"#,
        )
        .unwrap();

        assert_eq!(config.database_id, "guide");
        assert_eq!(config.feed_settings().collection, "tv_channels");
        assert_eq!(config.feed_settings().page_size, 25);
        assert_eq!(config.home_settings().section_size, 8);
        assert_eq!(config.home_settings().concurrency, 2);
        assert!(config.offline);
        assert_eq!(
            config.database_path(Path::new("/etc/tymax")),
            PathBuf::from("/etc/tymax/cache/guide.db")
        );

        let options = config.firestore_options().unwrap();
        assert_eq!(options.base_url.as_str(), "http://localhost:8080/");
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.max_retries, 1);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(matches!(
            Config::from_toml("page_size = \"ten\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml("page_size = 12\ntheme = \"dark\"\n").unwrap();
        assert_eq!(config.page_size, 12);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        for content in [
            "page_size = 0",
            "home_section_size = 0",
            "home_concurrency = 0",
            "request_timeout_secs = 0",
        ] {
            assert!(
                matches!(Config::from_toml(content), Err(ConfigError::Invalid { .. })),
                "{content} should be rejected"
            );
        }
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let err = Config::from_toml("base_url = \"ftp://example.com\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "base_url", .. }));
        assert!(Config::from_toml("base_url = \"not a url\"").is_err());
    }

    #[test]
    fn test_firestore_requires_project() {
        let err = Config::default().firestore_options().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "project_id", .. }));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = Config {
            api_key: Some("super-secret-key-12345".to_string()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_env_api_key_takes_precedence() {
        let key = resolve_api_key(Some("from-env".to_string()), Some("from-file")).unwrap();
        assert_eq!(key.expose_secret(), "from-env");

        let key = resolve_api_key(Some("  ".to_string()), Some("from-file")).unwrap();
        assert_eq!(key.expose_secret(), "from-file");

        assert!(resolve_api_key(None, Some("")).is_none());
    }

    #[test]
    fn test_default_database_path() {
        assert_eq!(
            Config::default().database_path(Path::new("/home/u/.config/tymax")),
            PathBuf::from("/home/u/.config/tymax/tymax.db")
        );
    }

    #[test]
    fn test_database_path_follows_config_file_location() {
        let base = config_base_dir(Path::new("/srv/guide/tymax.toml"));
        assert_eq!(base, PathBuf::from("/srv/guide"));
        assert_eq!(
            Config::default().database_path(&base),
            PathBuf::from("/srv/guide/tymax.db")
        );
        assert_eq!(config_base_dir(Path::new("tymax.toml")), PathBuf::from("."));
    }
}
