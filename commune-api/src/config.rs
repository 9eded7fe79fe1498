//! Runtime configuration for commune-api
//!
//! Combines command-line arguments (and their `COMMUNE_*` environment
//! variables) with the TOML bootstrap file. Command line wins.

use clap::Parser;
use commune_common::config::{resolve_database_path, TomlConfig, MIN_SESSION_SECRET_LEN};
use commune_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for commune-api
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "commune-api")]
#[command(about = "Community platform REST API")]
#[command(version)]
pub struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "COMMUNE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "COMMUNE_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "COMMUNE_PORT")]
    pub port: Option<u16>,

    /// SQLite database file
    #[arg(short, long, env = "COMMUNE_DATABASE")]
    pub database: Option<PathBuf>,

    /// HMAC key for session tokens
    #[arg(long, env = "COMMUNE_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Base URL of the mail service
    #[arg(long, env = "COMMUNE_NOTIFIER_URL")]
    pub notifier_url: Option<String>,

    /// Public base URL used in magic links
    #[arg(long, env = "COMMUNE_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    pub write_default_config: Option<PathBuf>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub public_url: String,
    pub database_path: PathBuf,
    /// `None` means "load or generate from the settings table"
    pub session_secret: Option<String>,
    pub session_ttl_hours: i64,
    pub magic_link_ttl_minutes: i64,
    pub cookie_secure: bool,
    pub super_admin_emails: Vec<String>,
    pub notifier_url: Option<String>,
    pub notifier_timeout: Duration,
    pub log_level: String,
    pub maintenance_interval: Duration,
}

impl ServiceConfig {
    /// Apply command-line overrides on top of the TOML values
    pub fn resolve(args: &Args, toml: TomlConfig) -> Result<Self> {
        let database_path = resolve_database_path(args.database.as_deref(), &toml);

        let session_secret = args
            .session_secret
            .clone()
            .or(toml.auth.session_secret)
            .filter(|s| !s.is_empty());
        if let Some(secret) = &session_secret {
            if secret.len() < MIN_SESSION_SECRET_LEN {
                return Err(Error::Config(format!(
                    "Session secret must be at least {} bytes",
                    MIN_SESSION_SECRET_LEN
                )));
            }
        }

        let public_url = args
            .public_url
            .clone()
            .unwrap_or(toml.server.public_url)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            host: args.host.clone().unwrap_or(toml.server.host),
            port: args.port.unwrap_or(toml.server.port),
            public_url,
            database_path,
            session_secret,
            session_ttl_hours: toml.auth.session_ttl_hours,
            magic_link_ttl_minutes: toml.auth.magic_link_ttl_minutes,
            cookie_secure: toml.auth.cookie_secure,
            super_admin_emails: toml
                .auth
                .super_admin_emails
                .iter()
                .map(|e| e.trim().to_lowercase())
                .collect(),
            notifier_url: args
                .notifier_url
                .clone()
                .or(toml.notifier.url)
                .filter(|u| !u.trim().is_empty()),
            notifier_timeout: Duration::from_secs(toml.notifier.timeout_secs.max(1)),
            log_level: toml.logging.level,
            maintenance_interval: Duration::from_secs(toml.maintenance.interval_secs),
        })
    }

    /// Defaults pointed at `database_path`, for tests and embedding
    pub fn for_database(database_path: PathBuf) -> Self {
        Self {
            database_path,
            ..Self::defaults()
        }
    }

    fn defaults() -> Self {
        // Defaults never fail validation
        let toml = TomlConfig::default();
        Self {
            host: toml.server.host,
            port: toml.server.port,
            public_url: toml.server.public_url,
            database_path: PathBuf::new(),
            session_secret: None,
            session_ttl_hours: toml.auth.session_ttl_hours,
            magic_link_ttl_minutes: toml.auth.magic_link_ttl_minutes,
            cookie_secure: toml.auth.cookie_secure,
            super_admin_emails: Vec::new(),
            notifier_url: None,
            notifier_timeout: Duration::from_secs(toml.notifier.timeout_secs),
            log_level: toml.logging.level,
            maintenance_interval: Duration::from_secs(toml.maintenance.interval_secs),
        }
    }

    /// `email` must already be normalized
    pub fn is_super_admin_email(&self, email: &str) -> bool {
        self.super_admin_emails.iter().any(|e| e == email)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `EnvFilter` directives used when `RUST_LOG` is unset
pub fn log_directives(level: &str) -> String {
    format!(
        "commune_api={level},commune_common={level},tower_http=info",
        level = level
    )
}
