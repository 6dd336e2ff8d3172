//! Configuration management
//!
//! Settings come from `config.yml` with `PHOTOSOCIAL_*` environment
//! variables layered on top. Every section is optional and falls back to
//! defaults suitable for local development.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "PHOTOSOCIAL_";

const DEFAULT_SECRET_KEY: &str = "change-this-secret-key";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma separated list of allowed CORS origins
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

impl ServerConfig {
    /// Allowed origins with surrounding whitespace removed
    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_origin
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/photosocial.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub driver: CacheDriver,
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Default entry lifetime in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

/// Cache driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

/// Token and account security settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign JWTs
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    #[serde(default = "default_access_token_expire_minutes")]
    pub access_token_expire_minutes: i64,
    #[serde(default = "default_refresh_token_expire_days")]
    pub refresh_token_expire_days: i64,
    #[serde(default = "default_verification_code_expire_minutes")]
    pub verification_code_expire_minutes: i64,
    #[serde(default = "default_password_reset_expire_minutes")]
    pub password_reset_expire_minutes: i64,
    /// Requests per minute allowed on write-heavy endpoints
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            access_token_expire_minutes: default_access_token_expire_minutes(),
            refresh_token_expire_days: default_refresh_token_expire_days(),
            verification_code_expire_minutes: default_verification_code_expire_minutes(),
            password_reset_expire_minutes: default_password_reset_expire_minutes(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
        }
    }
}

impl AuthConfig {
    /// True while the built-in development secret is still in use
    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == DEFAULT_SECRET_KEY
    }
}

fn default_secret_key() -> String {
    DEFAULT_SECRET_KEY.to_string()
}

fn default_access_token_expire_minutes() -> i64 {
    30
}

fn default_refresh_token_expire_days() -> i64 {
    7
}

fn default_verification_code_expire_minutes() -> i64 {
    15
}

fn default_password_reset_expire_minutes() -> i64 {
    30
}

fn default_rate_limit_per_minute() -> usize {
    60
}

/// Outgoing mail settings
///
/// When `smtp_host` is unset, messages are written to the log instead of
/// being delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_app_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_user: None,
            smtp_password: None,
            from_address: default_from_address(),
            from_name: default_app_name(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.as_deref().is_some_and(|h| !h.trim().is_empty())
    }

    /// `Name <address>` form used in the From header
    pub fn sender(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_address)
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

/// Google OAuth client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub google_client_id: Option<String>,
    #[serde(default)]
    pub google_client_secret: Option<String>,
    #[serde(default = "default_google_redirect_uri")]
    pub google_redirect_uri: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            google_client_id: None,
            google_client_secret: None,
            google_redirect_uri: default_google_redirect_uri(),
        }
    }
}

impl OAuthConfig {
    pub fn is_configured(&self) -> bool {
        self.google_client_id.is_some() && self.google_client_secret.is_some()
    }
}

fn default_google_redirect_uri() -> String {
    "http://localhost:8000/api/v1/auth/google/callback".to_string()
}

/// Public application identity and URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Base URL of the web client, used in email links and OAuth redirects
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    /// Base URL of this API, used to build absolute file URLs
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            frontend_url: default_frontend_url(),
            backend_url: default_backend_url(),
        }
    }
}

fn default_app_name() -> String {
    "Photo Social Platform".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory served under `/uploads`
    #[serde(default = "default_upload_root")]
    pub root: PathBuf,
    #[serde(default = "default_photo_subdir")]
    pub photo_subdir: String,
    #[serde(default = "default_profile_subdir")]
    pub profile_subdir: String,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Lowercase file extensions accepted for images
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// JPEG quality used when recompressing
    #[serde(default = "default_image_quality")]
    pub image_quality: u8,
    #[serde(default = "default_max_image_dimension")]
    pub max_image_width: u32,
    #[serde(default = "default_max_image_dimension")]
    pub max_image_height: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            root: default_upload_root(),
            photo_subdir: default_photo_subdir(),
            profile_subdir: default_profile_subdir(),
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
            image_quality: default_image_quality(),
            max_image_width: default_max_image_dimension(),
            max_image_height: default_max_image_dimension(),
        }
    }
}

fn default_upload_root() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_photo_subdir() -> String {
    "photos".to_string()
}

fn default_profile_subdir() -> String {
    "profiles".to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_image_quality() -> u8 {
    85
}

fn default_max_image_dimension() -> u32 {
    2048
}

impl UploadConfig {
    /// Lowercased extension of `filename`, if it has one
    pub fn extension_of(filename: &str) -> Option<String> {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Check if a file extension is allowed
    pub fn is_extension_allowed(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.allowed_extensions.iter().any(|a| *a == ext)
    }

    /// Allowed extensions formatted for error messages
    pub fn allowed_extensions_display(&self) -> String {
        self.allowed_extensions.join(", ")
    }

    /// Max file size in whole megabytes, for error messages
    pub fn max_file_size_mb(&self) -> u64 {
        self.max_file_size / (1024 * 1024)
    }

    pub fn photo_dir(&self) -> PathBuf {
        self.root.join(&self.photo_subdir)
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.root.join(&self.profile_subdir)
    }

    /// Path stored in the database and exposed under `/uploads`
    pub fn public_path(&self, subdir: &str, file_name: &str) -> String {
        format!("uploads/{}/{}", subdir, file_name)
    }

    /// Resolve a stored public path back to its location on disk
    pub fn disk_path(&self, public_path: &str) -> PathBuf {
        let relative = public_path
            .trim_start_matches('/')
            .trim_start_matches("uploads/");
        self.root.join(relative)
    }
}

/// Chat retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_message_retention_days")]
    pub message_retention_days: i64,
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            message_retention_days: default_message_retention_days(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

fn default_message_retention_days() -> i64 {
    365
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration. Invalid
    /// YAML produces an error carrying the line and column.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file, apply environment overrides and validate
    ///
    /// Variables follow `PHOTOSOCIAL_<SECTION>_<KEY>`, for example
    /// `PHOTOSOCIAL_SERVER_PORT` or `PHOTOSOCIAL_AUTH_SECRET_KEY`.
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.auth.secret_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.secret_key must not be empty".to_string(),
            ));
        }
        if !(1..=100).contains(&self.upload.image_quality) {
            return Err(ConfigError::ValidationError(format!(
                "upload.image_quality must be between 1 and 100, got {}",
                self.upload.image_quality
            )));
        }
        if self.upload.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_file_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        // Server
        override_string("SERVER_HOST", &mut self.server.host);
        override_parsed("SERVER_PORT", &mut self.server.port);
        override_string("SERVER_CORS_ORIGIN", &mut self.server.cors_origin);

        // Database
        if let Some(driver) = env_value("DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        override_string("DATABASE_URL", &mut self.database.url);

        // Cache
        if let Some(driver) = env_value("CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                _ => {}
            }
        }
        override_optional("CACHE_REDIS_URL", &mut self.cache.redis_url);
        override_parsed("CACHE_TTL_SECONDS", &mut self.cache.ttl_seconds);

        // Auth
        override_string("AUTH_SECRET_KEY", &mut self.auth.secret_key);
        override_parsed(
            "AUTH_ACCESS_TOKEN_EXPIRE_MINUTES",
            &mut self.auth.access_token_expire_minutes,
        );
        override_parsed(
            "AUTH_REFRESH_TOKEN_EXPIRE_DAYS",
            &mut self.auth.refresh_token_expire_days,
        );
        override_parsed(
            "AUTH_RATE_LIMIT_PER_MINUTE",
            &mut self.auth.rate_limit_per_minute,
        );

        // Email
        override_optional("EMAIL_SMTP_HOST", &mut self.email.smtp_host);
        override_parsed("EMAIL_SMTP_PORT", &mut self.email.smtp_port);
        override_optional("EMAIL_SMTP_USER", &mut self.email.smtp_user);
        override_optional("EMAIL_SMTP_PASSWORD", &mut self.email.smtp_password);
        override_string("EMAIL_FROM_ADDRESS", &mut self.email.from_address);
        override_string("EMAIL_FROM_NAME", &mut self.email.from_name);

        // OAuth
        override_optional("OAUTH_GOOGLE_CLIENT_ID", &mut self.oauth.google_client_id);
        override_optional(
            "OAUTH_GOOGLE_CLIENT_SECRET",
            &mut self.oauth.google_client_secret,
        );
        override_string(
            "OAUTH_GOOGLE_REDIRECT_URI",
            &mut self.oauth.google_redirect_uri,
        );

        // App
        override_string("APP_FRONTEND_URL", &mut self.app.frontend_url);
        override_string("APP_BACKEND_URL", &mut self.app.backend_url);

        // Upload
        if let Some(root) = env_value("UPLOAD_ROOT") {
            self.upload.root = PathBuf::from(root);
        }
        override_parsed("UPLOAD_MAX_FILE_SIZE", &mut self.upload.max_file_size);

        // Chat
        override_parsed(
            "CHAT_MESSAGE_RETENTION_DAYS",
            &mut self.chat.message_retention_days,
        );
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
}

fn override_string(key: &str, target: &mut String) {
    if let Some(value) = env_value(key) {
        *target = value;
    }
}

fn override_optional(key: &str, target: &mut Option<String>) {
    if let Some(value) = env_value(key) {
        *target = Some(value);
    }
}

/// Unparseable values are ignored and the current setting is kept
fn override_parsed<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Some(parsed) = env_value(key).and_then(|v| v.parse::<T>().ok()) {
        *target = parsed;
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const TEST_ENV_KEYS: &[&str] = &[
    "SERVER_HOST",
    "SERVER_PORT",
    "SERVER_CORS_ORIGIN",
    "DATABASE_DRIVER",
    "DATABASE_URL",
    "CACHE_DRIVER",
    "CACHE_REDIS_URL",
    "CACHE_TTL_SECONDS",
    "AUTH_SECRET_KEY",
    "AUTH_ACCESS_TOKEN_EXPIRE_MINUTES",
    "AUTH_REFRESH_TOKEN_EXPIRE_DAYS",
    "AUTH_RATE_LIMIT_PER_MINUTE",
    "EMAIL_SMTP_HOST",
    "EMAIL_SMTP_PORT",
    "EMAIL_SMTP_USER",
    "EMAIL_SMTP_PASSWORD",
    "EMAIL_FROM_ADDRESS",
    "EMAIL_FROM_NAME",
    "OAUTH_GOOGLE_CLIENT_ID",
    "OAUTH_GOOGLE_CLIENT_SECRET",
    "OAUTH_GOOGLE_REDIRECT_URI",
    "APP_FRONTEND_URL",
    "APP_BACKEND_URL",
    "UPLOAD_ROOT",
    "UPLOAD_MAX_FILE_SIZE",
    "CHAT_MESSAGE_RETENTION_DAYS",
];

#[cfg(test)]
fn clear_test_env() {
    for key in TEST_ENV_KEYS {
        std::env::remove_var(format!("{}{}", ENV_PREFIX, key));
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn valid_host_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)
                .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
            Just("localhost".to_string()),
            "[a-z][a-z0-9]{0,10}".prop_map(|s| s),
        ]
    }

    fn valid_database_config_strategy() -> impl Strategy<Value = DatabaseConfig> {
        (
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            prop_oneof![
                "[a-z][a-z0-9_/]{0,20}\\.db".prop_map(|s| s),
                Just(":memory:".to_string()),
                Just("mysql://root@127.0.0.1:3306/photosocial".to_string()),
            ],
        )
            .prop_map(|(driver, url)| DatabaseConfig { driver, url })
    }

    fn valid_auth_config_strategy() -> impl Strategy<Value = AuthConfig> {
        ("[A-Za-z0-9]{8,40}", 1i64..=1440, 1i64..=90, 1usize..=1000).prop_map(
            |(secret_key, access, refresh, rate)| AuthConfig {
                secret_key,
                access_token_expire_minutes: access,
                refresh_token_expire_days: refresh,
                rate_limit_per_minute: rate,
                ..AuthConfig::default()
            },
        )
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            valid_host_strategy(),
            1u16..=65535,
            valid_database_config_strategy(),
            valid_auth_config_strategy(),
            1u8..=100,
            1i64..=3650,
        )
            .prop_map(|(host, port, database, auth, quality, retention)| Config {
                server: ServerConfig {
                    host,
                    port,
                    ..ServerConfig::default()
                },
                database,
                auth,
                upload: UploadConfig {
                    image_quality: quality,
                    ..UploadConfig::default()
                },
                chat: ChatConfig {
                    message_retention_days: retention,
                    ..ChatConfig::default()
                },
                ..Config::default()
            })
    }

    fn malformed_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("server:\n  port: not_a_number".to_string()),
            Just("server:\n  port: [1, 2, 3]".to_string()),
            Just("server:\n  port: 99999999999999999999".to_string()),
            Just("database:\n  driver: postgres".to_string()),
            Just("cache:\n  driver: memcached".to_string()),
            Just("auth:\n  access_token_expire_minutes: soon".to_string()),
            Just("upload:\n  image_quality: 300".to_string()),
            Just("upload:\n  allowed_extensions: jpg".to_string()),
            Just("chat: true".to_string()),
            Just("server: [invalid, list]".to_string()),
        ]
    }

    fn partial_config_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            (valid_host_strategy(), 1u16..=65535)
                .prop_map(|(host, port)| format!("server:\n  host: \"{}\"\n  port: {}\n", host, port)),
            Just("database:\n  driver: sqlite\n".to_string()),
            Just("auth:\n  refresh_token_expire_days: 14\n".to_string()),
            Just("email:\n  from_name: \"Gallery\"\n".to_string()),
            Just("upload:\n  max_image_width: 1024\n".to_string()),
            Just("chat:\n  cleanup_interval_hours: 6\n".to_string()),
            Just("".to_string()),
            Just("   \n\n   ".to_string()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// A serialized config parses back to the same values
        #[test]
        fn config_roundtrips_through_yaml(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(config.server.host, parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.database.driver, parsed.database.driver);
            prop_assert_eq!(config.database.url, parsed.database.url);
            prop_assert_eq!(config.auth.secret_key, parsed.auth.secret_key);
            prop_assert_eq!(config.auth.access_token_expire_minutes, parsed.auth.access_token_expire_minutes);
            prop_assert_eq!(config.auth.rate_limit_per_minute, parsed.auth.rate_limit_per_minute);
            prop_assert_eq!(config.upload.image_quality, parsed.upload.image_quality);
            prop_assert_eq!(config.chat.message_retention_days, parsed.chat.message_retention_days);
        }

        /// Partial files get defaults for everything they leave out
        #[test]
        fn partial_config_gets_defaults(yaml in partial_config_yaml_strategy()) {
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let config = Config::load(file.path()).expect("Failed to parse config");

            prop_assert!(!config.server.host.is_empty());
            prop_assert!(config.server.port > 0);
            prop_assert!(!config.database.url.is_empty());
            prop_assert!(!config.auth.secret_key.is_empty());
            prop_assert!(config.upload.max_file_size > 0);
            prop_assert!(!config.upload.allowed_extensions.is_empty());
            prop_assert!(config.validate().is_ok());

            if yaml.trim().is_empty() {
                prop_assert_eq!(config.server.port, 8000);
                prop_assert_eq!(config.database.url, "data/photosocial.db");
                prop_assert_eq!(config.app.name, "Photo Social Platform");
            }
        }

        /// Malformed files fail with a descriptive error
        #[test]
        fn malformed_config_is_rejected(yaml in malformed_yaml_strategy()) {
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let result = Config::load(file.path());
            prop_assert!(result.is_err(), "Malformed YAML should produce an error");

            let err_msg = result.unwrap_err().to_string();
            prop_assert!(err_msg.len() > 10, "Error message should be descriptive: {}", err_msg);
        }

        /// Environment values win over file values
        #[test]
        fn env_takes_precedence_over_file(
            file_port in 1000u16..2000,
            env_port in 3000u16..4000,
            retention in 1i64..1000,
        ) {
            let _guard = lock_env();
            clear_test_env();

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "server:\n  port: {}\nchat:\n  message_retention_days: 5000\n", file_port)
                .expect("Failed to write config");

            std::env::set_var("PHOTOSOCIAL_SERVER_PORT", env_port.to_string());
            std::env::set_var("PHOTOSOCIAL_CHAT_MESSAGE_RETENTION_DAYS", retention.to_string());

            let config = Config::load_with_env(file.path()).expect("Failed to load config");

            prop_assert_eq!(config.server.port, env_port);
            prop_assert_eq!(config.chat.message_retention_days, retention);

            clear_test_env();
        }
    }
}
