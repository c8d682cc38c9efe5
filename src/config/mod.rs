use dotenv::dotenv;
use std::env;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub prometheus_port: u16,
    pub max_connections: u32,
    /// Create `auth.users`, `auth.uid()` and client roles when migrating.
    pub auth_bootstrap: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| "jwt_secret".to_string());
        let prometheus_port = parse_or(&lookup, "PROMETHEUS_PORT", 9898)?;
        let max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;
        let auth_bootstrap = match lookup("AUTH_BOOTSTRAP") {
            None => false,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => return Err(ConfigError::Invalid { key: "AUTH_BOOTSTRAP", value: v }),
            },
        };
        Ok(Self {
            database_url,
            jwt_secret,
            prometheus_port,
            max_connections,
            auth_bootstrap,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}
