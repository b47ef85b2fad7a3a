//! configs/src/lib.rs
//!
//! Layered application configuration, lowest priority first:
//! built-in defaults, `config/content.toml` (optional), `.env`, and
//! `CONTENT__SECTION__KEY` environment variables.
//!
//! The result is built once at startup and handed to whoever needs it.

use config::{Config, Environment, File, FileFormat, Source};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE: &str = "config/content";
pub const ENV_PREFIX: &str = "CONTENT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to read .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cascade: CascadeConfig,
    pub log: LogConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    /// Connection URL; may carry credentials, hence secret.
    pub url: SecretString,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: SecretString::from(String::from("sqlite::memory:")),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Upper bound on entities removed by one cascade. Unset means unbounded.
    pub max_entities: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub articles: usize,
    /// Delete the first seeded article afterwards to exercise the cascade.
    pub purge_first: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            articles: 3,
            purge_first: false,
        }
    }
}

impl AppConfig {
    /// Loads `.env`, then layers the optional config file and the process
    /// environment over the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        load_dotenv()?;
        Self::layered(File::with_name(CONFIG_FILE).required(false), environment())
    }

    /// Builds from a TOML document alone, ignoring the process environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::layered(
            File::from_str(toml, FileFormat::Toml),
            environment().source(Some(config::Map::new())),
        )
    }

    fn layered<F>(file: F, env: Environment) -> Result<Self, ConfigError>
    where
        F: Source + Send + Sync + 'static,
    {
        let config: AppConfig = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.database.backend == StoreBackend::Sqlite
            && self.database.url.expose_secret().trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "database.url is required for the sqlite backend".to_string(),
            ));
        }
        if self.cascade.max_entities == Some(0) {
            return Err(ConfigError::Invalid(
                "cascade.max_entities must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!(path = %path.display(), "loaded .env");
            Ok(())
        }
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert_eq!(config.database.url.expose_secret(), "sqlite::memory:");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.cascade.max_entities, None);
        assert_eq!(config.log.filter, "info");
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.seed.articles, 3);
        assert!(!config.seed.purge_first);
    }

    #[test]
    fn toml_sections_override_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [database]
            backend = "sqlite"
            url = "sqlite://content.db"

            [cascade]
            max_entities = 500

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.backend, StoreBackend::Sqlite);
        assert_eq!(config.database.url.expose_secret(), "sqlite://content.db");
        assert_eq!(config.cascade.max_entities, Some(500));
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn environment_beats_file() {
        let env = config::Map::from([
            ("CONTENT__SEED__ARTICLES".to_string(), "7".to_string()),
            ("CONTENT__SEED__PURGE_FIRST".to_string(), "true".to_string()),
        ]);
        let config = AppConfig::layered(
            File::from_str("[seed]\narticles = 2", FileFormat::Toml),
            environment().source(Some(env)),
        )
        .unwrap();
        assert_eq!(config.seed.articles, 7);
        assert!(config.seed.purge_first);
    }

    #[test]
    fn zero_cascade_limit_is_rejected() {
        let err = AppConfig::from_toml_str("[cascade]\nmax_entities = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn secret_url_is_not_printed() {
        let config = AppConfig::from_toml_str("[database]\nurl = \"sqlite://secret.db\"").unwrap();
        assert!(!format!("{:?}", config.database).contains("secret.db"));
    }
}
