use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::leads::{EngineSettings, StoreLimits};

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
    pub scoring: ScoringConfig,
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
        let collector_endpoint = env::var("APP_TELEMETRY_ENDPOINT")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let collector_timeout_ms = parse_var("APP_TELEMETRY_TIMEOUT_MS", 2_000u64)?;

        let defaults = StoreLimits::default();
        let scoring = ScoringConfig {
            storage_path: env::var("APP_STORAGE_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            storage_quota_bytes: parse_var("APP_STORAGE_QUOTA_BYTES", 5 * 1024 * 1024usize)?,
            profile_retention: parse_var("APP_PROFILE_RETENTION", defaults.profile_retention)?,
            activity_retention: parse_var(
                "APP_ACTIVITY_RETENTION",
                EngineSettings::default().activity_retention,
            )?,
            cache_capacity: parse_var(
                "APP_PROFILE_CACHE_CAPACITY",
                EngineSettings::default().cache_capacity,
            )?,
            persisted_activities: defaults.persisted_activities,
            minimal_activities: defaults.minimal_activities,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                collector_endpoint,
                collector_timeout: Duration::from_millis(collector_timeout_ms),
            },
            scoring,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var: name }),
        _ => Ok(default),
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

/// Log filter and remote collector controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub collector_endpoint: Option<String>,
    pub collector_timeout: Duration,
}

/// Storage and retention dials for the scoring engine.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// SQLite file backing the profile area; in-memory when unset.
    pub storage_path: Option<PathBuf>,
    pub storage_quota_bytes: usize,
    pub profile_retention: usize,
    pub activity_retention: usize,
    /// Profiles held in the engine's in-process cache.
    pub cache_capacity: usize,
    pub persisted_activities: usize,
    pub minimal_activities: usize,
}

impl ScoringConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            activity_retention: self.activity_retention,
            cache_capacity: self.cache_capacity,
        }
    }

    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            persisted_activities: self.persisted_activities.min(self.activity_retention),
            minimal_activities: self.minimal_activities,
            profile_retention: self.profile_retention,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a non-negative integer")
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
