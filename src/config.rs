//! Application configuration loaded from environment variables.
//!
//! Read once at startup. A `.env` file is honored for local development.

use std::env;

/// Which document database backs the data-access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Firestore,
    /// In-process store; data is lost on restart.
    Memory,
}

/// Firebase project settings, as handed to the web client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub database_url: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
}

/// Build and version information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versions {
    pub app: &'static str,
    pub build_id: &'static str,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix for persisted state keys and log context
    pub app_name: String,
    /// Environment label (DEV, PROD, ...)
    pub env_name: String,
    pub production: bool,
    pub firebase: FirebaseConfig,
    pub backend: Backend,
    /// Local key-value store file
    pub state_file: String,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let backend = match env::var("STREAM_BACKEND") {
            Ok(value) => parse_backend(&value)?,
            Err(_) => Backend::Firestore,
        };

        let production = match env::var("STREAM_PRODUCTION") {
            Ok(value) => parse_bool("STREAM_PRODUCTION", &value)?,
            Err(_) => false,
        };

        let firebase = FirebaseConfig {
            api_key: env::var("FIREBASE_API_KEY").unwrap_or_default(),
            auth_domain: env::var("FIREBASE_AUTH_DOMAIN").unwrap_or_default(),
            database_url: env::var("FIREBASE_DATABASE_URL").unwrap_or_default(),
            project_id: env::var("FIREBASE_PROJECT_ID").unwrap_or_default(),
            storage_bucket: env::var("FIREBASE_STORAGE_BUCKET").unwrap_or_default(),
            messaging_sender_id: env::var("FIREBASE_MESSAGING_SENDER_ID").unwrap_or_default(),
        };

        if backend == Backend::Firestore {
            if firebase.api_key.is_empty() {
                return Err(ConfigError::Missing("FIREBASE_API_KEY"));
            }
            if firebase.project_id.is_empty() {
                return Err(ConfigError::Missing("FIREBASE_PROJECT_ID"));
            }
        }

        let port = match env::var("PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            Err(_) => 8080,
        };

        Ok(Self {
            app_name: env::var("STREAM_APP_NAME").unwrap_or_else(|_| "STREAM".to_string()),
            env_name: env::var("STREAM_ENV_NAME").unwrap_or_else(|_| "DEV".to_string()),
            production,
            firebase,
            backend,
            state_file: env::var("STREAM_STATE_FILE")
                .unwrap_or_else(|_| "stream-state.json".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:4200".to_string()),
            port,
        })
    }

    /// Fixed configuration for tests: in-memory backend, development mode.
    pub fn test_default() -> Self {
        Self {
            app_name: "STREAM".to_string(),
            env_name: "TEST".to_string(),
            production: false,
            firebase: FirebaseConfig {
                api_key: "test-api-key".to_string(),
                project_id: "test-project".to_string(),
                ..Default::default()
            },
            backend: Backend::Memory,
            state_file: "stream-state.json".to_string(),
            frontend_url: "http://localhost:4200".to_string(),
            port: 8080,
        }
    }

    pub fn versions() -> Versions {
        Versions {
            app: env!("CARGO_PKG_VERSION"),
            build_id: option_env!("BUILD_ID").unwrap_or("unknown"),
        }
    }
}

fn parse_backend(value: &str) -> Result<Backend, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "firestore" => Ok(Backend::Firestore),
        "memory" => Ok(Backend::Memory),
        _ => Err(ConfigError::Invalid {
            name: "STREAM_BACKEND",
            value: value.to_string(),
        }),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Single test touching the process environment, so no races.
        env::set_var("STREAM_BACKEND", "memory");
        env::set_var("STREAM_PRODUCTION", "true");
        env::set_var("STREAM_ENV_NAME", "PROD");
        env::remove_var("PORT");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.backend, Backend::Memory);
        assert!(config.production);
        assert_eq!(config.env_name, "PROD");
        assert_eq!(config.port, 8080);

        env::set_var("STREAM_BACKEND", "postgres");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "STREAM_BACKEND",
                ..
            })
        ));
        env::remove_var("STREAM_BACKEND");
        env::remove_var("STREAM_PRODUCTION");
        env::remove_var("STREAM_ENV_NAME");
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_versions_report_package_version() {
        assert_eq!(Config::versions().app, env!("CARGO_PKG_VERSION"));
    }
}
