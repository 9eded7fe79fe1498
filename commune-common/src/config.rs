//! Configuration loading and database path resolution
//!
//! Bootstrap configuration comes from a TOML file. Every section is optional:
//! a missing file logs a warning and compiled defaults apply. Values given on
//! the command line (or their environment variables, handled by clap in the
//! binary) override the TOML values.
//!
//! Priority order:
//! 1. Command-line argument / environment variable
//! 2. TOML config file
//! 3. Compiled default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Minimum accepted length of a configured session signing secret
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to SQLite database file
    pub database_path: Option<PathBuf>,

    pub server: ServerConfig,

    pub auth: AuthConfig,
    pub notifier: NotifierConfig,
    pub logging: LoggingConfig,
    pub maintenance: MaintenanceConfig,
}

/// HTTP listener and public URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL used when building magic links
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5800,
            public_url: "http://localhost:5800".to_string(),
        }
    }
}

/// Magic link and session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for session tokens. Generated and stored in the database
    /// when absent.
    pub session_secret: Option<String>,
    pub session_ttl_hours: i64,
    pub magic_link_ttl_minutes: i64,
    /// Adds `Secure` to the session cookie
    pub cookie_secure: bool,
    /// Members signing in with one of these emails are granted SUPER_ADMIN
    pub super_admin_emails: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_ttl_hours: 168,
            magic_link_ttl_minutes: 15,
            cookie_secure: false,
            super_admin_emails: Vec::new(),
        }
    }
}

/// Notification service client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Base URL of the mail service. Notifications are only logged when unset.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Background cleanup of expired credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { interval_secs: 3600 }
    }
}

impl TomlConfig {
    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if let Some(secret) = &self.auth.session_secret {
            if secret.len() < MIN_SESSION_SECRET_LEN {
                return Err(Error::Config(format!(
                    "auth.session_secret must be at least {} bytes",
                    MIN_SESSION_SECRET_LEN
                )));
            }
        }
        if self.auth.session_ttl_hours <= 0 {
            return Err(Error::Config("auth.session_ttl_hours must be positive".to_string()));
        }
        if self.auth.magic_link_ttl_minutes <= 0 {
            return Err(Error::Config(
                "auth.magic_link_ttl_minutes must be positive".to_string(),
            ));
        }
        if self.server.public_url.trim().is_empty() {
            return Err(Error::Config("server.public_url must not be empty".to_string()));
        }
        if self.maintenance.interval_secs == 0 {
            return Err(Error::Config("maintenance.interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// True when `email` (already normalized) is configured as a super admin
    pub fn is_super_admin_email(&self, email: &str) -> bool {
        self.auth
            .super_admin_emails
            .iter()
            .any(|configured| configured.trim().eq_ignore_ascii_case(email))
    }
}

/// Load TOML configuration
///
/// With an explicit path, a missing file logs a warning and returns defaults.
/// Without one, the platform config locations are searched.
/// A file that exists but does not parse is an error.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                warn!("Config file not found: {} (using defaults)", path.display());
                return Ok(TomlConfig::default());
            }
            path.to_path_buf()
        }
        None => match find_config_file() {
            Some(path) => path,
            None => {
                warn!("No config file found (using defaults)");
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Search `~/.config/commune/commune.toml`, then `/etc/commune/commune.toml`
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("commune").join("commune.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/commune/commune.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("commune"))
        .unwrap_or_else(|| PathBuf::from("./commune_data"))
        .join("commune.db")
}

/// Resolve database path: command line/env, then TOML, then compiled default
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Some(path) = &config.database_path {
        return path.clone();
    }

    default_database_path()
}

/// Write configuration back to disk (used by `--write-default-config`)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    // Atomic replace via sibling temp file
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
