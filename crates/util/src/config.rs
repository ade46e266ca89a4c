use std::{env, fmt, net::SocketAddr, time::Duration};

use super::{database_url, server_bind_address};

const DEV_SESSION_SECRET: &str = "crm-development-session-secret";
const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Credentials of the single operator account allowed to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoUser {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub session_secret: Vec<u8>,
    pub session_ttl: Duration,
    pub demo_user: DemoUser,
    pub seed_demo_data: bool,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let session_secret = match env::var("SESSION_SECRET") {
            Ok(value) if !value.trim().is_empty() => value.into_bytes(),
            _ if environment == Environment::Production => {
                return Err(ConfigError::MissingVar("SESSION_SECRET"));
            }
            _ => DEV_SESSION_SECRET.as_bytes().to_vec(),
        };

        let session_ttl = match env::var("SESSION_TTL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidNumber {
                    var: "SESSION_TTL_SECS",
                    value: raw,
                })?,
            Err(_) => Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        };

        let demo_user = DemoUser {
            email: env::var("DEMO_USER_EMAIL").unwrap_or_else(|_| "admin@crm.com".to_string()),
            password: env::var("DEMO_USER_PASSWORD").unwrap_or_else(|_| "admin123".to_string()),
            name: env::var("DEMO_USER_NAME").unwrap_or_else(|_| "Admin User".to_string()),
        };

        let seed_demo_data = match env::var("CRM_SEED_DEMO") {
            Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidBool {
                var: "CRM_SEED_DEMO",
                value: raw,
            })?,
            Err(_) => false,
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url: database_url(),
            session_secret,
            session_ttl,
            demo_user,
            seed_demo_data,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVar(&'static str),
    InvalidNumber { var: &'static str, value: String },
    InvalidBool { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVar(var) => write!(f, "{var} must be set in production"),
            Self::InvalidNumber { var, value } => {
                write!(f, "{var} must be a positive integer (got {value})")
            }
            Self::InvalidBool { var, value } => {
                write!(f, "{var} must be a boolean flag (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
