//! Configuration management
//!
//! This module handles loading and parsing configuration for the snippetbox server.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Security configuration
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on the time spent handling a single request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    1024 * 1024 // 1MB
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
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
    "data/snippetbox.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Absolute session lifetime in hours
    #[serde(default = "default_lifetime_hours")]
    pub lifetime_hours: i64,
    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Whether the session cookie carries the Secure attribute
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
    /// How often expired sessions are swept from the store
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_hours: default_lifetime_hours(),
            cookie_name: default_cookie_name(),
            cookie_secure: default_cookie_secure(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_lifetime_hours() -> i64 {
    12
}

fn default_cookie_name() -> String {
    "session".to_string()
}

fn default_cookie_secure() -> bool {
    true
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

/// Security configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Secret used to derive CSRF tokens. A random secret is generated at
    /// startup when this is unset, which invalidates outstanding forms on restart.
    #[serde(default)]
    pub csrf_secret: Option<String>,
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
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        // Handle empty file - return defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - SNIPPETBOX_SERVER_HOST
    /// - SNIPPETBOX_SERVER_PORT
    /// - SNIPPETBOX_SERVER_REQUEST_TIMEOUT_SECS
    /// - SNIPPETBOX_DATABASE_DRIVER
    /// - SNIPPETBOX_DATABASE_URL
    /// - SNIPPETBOX_SESSION_LIFETIME_HOURS
    /// - SNIPPETBOX_SESSION_COOKIE_SECURE
    /// - SNIPPETBOX_CSRF_SECRET
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Socket address string the server binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("SNIPPETBOX_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SNIPPETBOX_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(secs) = std::env::var("SNIPPETBOX_SERVER_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.server.request_timeout_secs = secs;
            }
        }

        // Database configuration
        if let Ok(driver) = std::env::var("SNIPPETBOX_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("SNIPPETBOX_DATABASE_URL") {
            self.database.url = url;
        }

        // Session configuration
        if let Ok(hours) = std::env::var("SNIPPETBOX_SESSION_LIFETIME_HOURS") {
            if let Ok(hours) = hours.parse::<i64>() {
                if hours > 0 {
                    self.session.lifetime_hours = hours;
                }
            }
        }
        if let Ok(secure) = std::env::var("SNIPPETBOX_SESSION_COOKIE_SECURE") {
            if let Ok(secure) = secure.parse::<bool>() {
                self.session.cookie_secure = secure;
            }
        }

        // Security configuration
        if let Ok(secret) = std::env::var("SNIPPETBOX_CSRF_SECRET") {
            if !secret.is_empty() {
                self.security.csrf_secret = Some(secret);
            }
        }
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

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
