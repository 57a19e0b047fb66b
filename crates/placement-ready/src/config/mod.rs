use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::RetryPolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database_path = env::var("APP_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE_PATH));
        let busy_timeout_ms = numeric_var("APP_DB_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS)?;
        let retry_attempts = numeric_var("APP_DB_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?;
        let retry_backoff_ms = numeric_var("APP_DB_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)?;

        if retry_attempts == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "APP_DB_RETRY_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
                with_targets: environment != AppEnvironment::Production,
            },
            storage: StorageConfig {
                database_path,
                busy_timeout: Duration::from_millis(busy_timeout_ms),
                retry: RetryPolicy {
                    max_attempts: retry_attempts as u32,
                    backoff: Duration::from_millis(retry_backoff_ms),
                },
            },
        })
    }
}

const DEFAULT_DATABASE_PATH: &str = "placement_tracker.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_RETRY_ATTEMPTS: u64 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;

fn numeric_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Colorized output; only sensible on an interactive terminal.
    pub ansi: bool,
    pub with_targets: bool,
}

/// Location of the SQLite database and the handle acquisition policy.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive whole number, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
