use serde::{Deserialize, Serialize};

use std::{env, fs, path::Path, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Postgres DSN; the in-memory store is used when absent.
    #[serde(default)]
    pub database_dsn: Option<String>,
    #[serde(default = "default_token_ttl", with = "humantime_serde")]
    pub token_ttl: Duration,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },
}

const fn default_port() -> u16 {
    8000
}

const fn default_token_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

const fn default_min_password_length() -> usize {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_dsn: None,
            token_ttl: default_token_ttl(),
            min_password_length: default_min_password_length(),
        }
    }
}

fn load_from_file(path: &str) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;

    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

fn load_from_env() -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Ok(port) = env::var("PORT") {
        config.port = port.parse().map_err(|e| ConfigError::Env {
            var: "PORT",
            reason: format!("{e}"),
        })?;
    }

    config.database_dsn = env::var("PG_DSN").ok();

    if let Ok(ttl) = env::var("TOKEN_TTL") {
        config.token_ttl = humantime_serde::re::humantime::parse_duration(&ttl).map_err(|e| {
            ConfigError::Env {
                var: "TOKEN_TTL",
                reason: format!("{e}"),
            }
        })?;
    }

    if let Ok(length) = env::var("MIN_PASSWORD_LENGTH") {
        config.min_password_length = length.parse().map_err(|e| ConfigError::Env {
            var: "MIN_PASSWORD_LENGTH",
            reason: format!("{e}"),
        })?;
    }

    Ok(config)
}

pub fn load_config() -> Result<Config, ConfigError> {
    // Retrieve env variable
    let config_path =
        env::var("NOTES_SERVER_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

    // Try env path
    if Path::new(&config_path).exists() {
        return load_from_file(&config_path);
    }

    // Fallback to config.yaml
    if Path::new("config.yaml").exists() {
        tracing::warn!(
            "Config file '{}' not found, falling back to 'config.yaml'",
            config_path
        );
        return load_from_file("config.yaml");
    }

    // Fallback to config.example.yaml
    if Path::new("config.example.yaml").exists() {
        tracing::warn!(
            "Config file '{}' and 'config.yaml' not found, falling back to 'config.example.yaml'\
             \n This file should not be used and should be replaced with actual data",
            config_path
        );
        return load_from_file("config.example.yaml");
    }

    // Fallback to environment variables
    tracing::info!(
        "No config file found, attempting to load configuration from environment variables"
    );
    load_from_env()
}
