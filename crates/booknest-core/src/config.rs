use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config as cfg;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

const FALLBACK_TOKEN_SECRET: &str = "fallbackSecret";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurrealDbConfig {
    /// Connection string, e.g. "ws://localhost:8000" or "mem://"
    pub connection: String,
    #[serde(default = "SurrealDbConfig::default_namespace")]
    pub namespace: String,
    #[serde(default = "SurrealDbConfig::default_database")]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,
}

impl SurrealDbConfig {
    fn default_namespace() -> String {
        "booknest".to_string()
    }

    fn default_database() -> String {
        "library".to_string()
    }
}

impl Default for SurrealDbConfig {
    fn default() -> Self {
        Self {
            connection: "ws://localhost:8000".into(),
            namespace: Self::default_namespace(),
            database: Self::default_database(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    #[default]
    Memory,
    #[serde(alias = "surreal", alias = "surrealdb")]
    SurrealDb,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DatabaseBackend,
    #[serde(default)]
    pub surrealdb: SurrealDbConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing)]
    pub token_secret: Option<SecretString>,
    #[serde(default = "AuthConfig::default_token_days")]
    pub token_days: i64,
    #[serde(default = "AuthConfig::default_login_per_minute")]
    pub login_per_minute: u32,
}

impl AuthConfig {
    fn default_token_days() -> i64 {
        60
    }

    fn default_login_per_minute() -> u32 {
        120
    }

    pub fn token_secret(&self) -> &str {
        self.token_secret
            .as_ref()
            .map(|s| s.expose_secret())
            .unwrap_or(FALLBACK_TOKEN_SECRET)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_days: Self::default_token_days(),
            login_per_minute: Self::default_login_per_minute(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "MediaConfig::default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub cloud_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_secret: Option<SecretString>,
    #[serde(default = "MediaConfig::default_folder")]
    pub folder: String,
    #[serde(default = "MediaConfig::default_posters_page")]
    pub posters_page_size: u32,
}

impl MediaConfig {
    fn default_api_base() -> String {
        "https://api.cloudinary.com/v1_1".to_string()
    }

    fn default_folder() -> String {
        "bookposter".to_string()
    }

    fn default_posters_page() -> u32 {
        10
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_base: Self::default_api_base(),
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: Self::default_folder(),
            posters_page_size: Self::default_posters_page(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "booknest_api=debug,booknest_store=info,tower_http=debug".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "Settings::default_env")]
    pub env: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Self::default_env(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            media: MediaConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    fn default_env() -> String {
        env::var("APP_ENV")
            .ok()
            .or_else(|| env::var("RUST_ENV").ok())
            .unwrap_or_else(|| "development".to_string())
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.server.host.trim().is_empty(),
            "server.host cannot be empty"
        );
        anyhow::ensure!(self.server.port > 0, "server.port must be > 0");
        anyhow::ensure!(self.auth.token_days > 0, "auth.token_days must be > 0");
        anyhow::ensure!(
            self.auth.login_per_minute > 0,
            "auth.login_per_minute must be > 0"
        );

        if self.database.backend == DatabaseBackend::SurrealDb {
            anyhow::ensure!(
                !self.database.surrealdb.connection.is_empty(),
                "database.surrealdb.connection cannot be empty"
            );
            anyhow::ensure!(
                !self.database.surrealdb.namespace.is_empty(),
                "database.surrealdb.namespace cannot be empty"
            );
            anyhow::ensure!(
                !self.database.surrealdb.database.is_empty(),
                "database.surrealdb.database cannot be empty"
            );
        }

        if self.is_production() {
            anyhow::ensure!(
                self.auth.token_secret.is_some(),
                "auth.token_secret must be set in production"
            );
        }

        Ok(())
    }

    /// Warnings about settings that load but should not reach a real deployment.
    pub fn notices(&self) -> Vec<String> {
        let mut notices = Vec::new();
        if self.auth.token_secret.is_none() {
            notices.push(
                "auth.token_secret is not set; using the development fallback secret".to_string(),
            );
        }
        notices
    }

    /// Applies the plain environment variables older deployments use.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(secret) = lookup("TOKEN_SECRET").filter(|s| !s.trim().is_empty()) {
            self.auth.token_secret = Some(SecretString::from(secret));
        }
        if let Some(url) = lookup("SURREALDB_URL").filter(|s| !s.trim().is_empty()) {
            self.database.backend = DatabaseBackend::SurrealDb;
            self.database.surrealdb.connection = url;
        }
        if let Some(name) = lookup("CLOUDINARY_CLOUD_NAME") {
            self.media.cloud_name = Some(name);
        }
        if let Some(key) = lookup("CLOUDINARY_API_KEY") {
            self.media.api_key = Some(key);
        }
        if let Some(secret) = lookup("CLOUDINARY_API_SECRET") {
            self.media.api_secret = Some(SecretString::from(secret));
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    settings: Settings,
    config_dir: PathBuf,
    notices: Vec<String>,
}

impl ConfigManager {
    /// Loads `.env`, the layered config files and environment overrides.
    ///
    /// Runs before logging is set up, so anything worth reporting is kept in
    /// [`ConfigManager::notices`] for the caller to log.
    pub fn load(env_override: Option<String>) -> Result<Self> {
        let mut notices = Vec::new();
        if let Err(e) = dotenv::dotenv() {
            if !e.not_found() {
                notices.push(format!("Failed to load .env file: {}", e));
            }
        }

        let env_name = env_override.unwrap_or_else(Settings::default_env);
        let config_dir = Self::default_config_dir();
        let mut settings = Self::load_from_sources(&config_dir, &env_name)?;
        settings.env = env_name;
        settings.apply_legacy_env(|key| env::var(key).ok());
        settings.validate()?;
        notices.extend(settings.notices());

        Ok(Self {
            settings,
            config_dir,
            notices,
        })
    }

    /// Wraps already-built settings, for tests and tools.
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            notices: settings.notices(),
            settings,
            config_dir: PathBuf::from("."),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// `$BOOKNEST_CONFIG_DIR`, then `./config/`, then the working directory.
    pub fn default_config_dir() -> PathBuf {
        if let Ok(dir) = env::var("BOOKNEST_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let project_config = cwd.join("config");
        if project_config.exists() {
            return project_config;
        }
        cwd
    }

    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Settings> {
        let settings: Settings = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(cfg::Environment::with_prefix("BOOKNEST").separator("__"))
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn layered_files_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[server]\nhost = \"127.0.0.1\"\nport = 4000\n\n[media]\nfolder = \"covers\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("staging.toml"), "[server]\nhost = \"127.0.0.1\"\nport = 4100\n").unwrap();

        let settings = ConfigManager::load_from_sources(dir.path(), "staging").unwrap();
        assert_eq!(settings.server.port, 4100);
        assert_eq!(settings.media.folder, "covers");
        assert_eq!(settings.auth.token_days, 60);
        assert_eq!(settings.database.backend, DatabaseBackend::Memory);
    }

    #[test]
    fn legacy_variables_are_honoured() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "8081"),
            ("TOKEN_SECRET", "s3cret-value"),
            ("SURREALDB_URL", "ws://db:8000"),
        ]
        .into_iter()
        .collect();
        let mut settings = Settings::default();
        settings.apply_legacy_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.auth.token_secret(), "s3cret-value");
        assert_eq!(settings.database.backend, DatabaseBackend::SurrealDb);
        assert_eq!(settings.database.surrealdb.connection, "ws://db:8000");
    }

    #[test]
    fn missing_secret_is_reported_for_later_logging() {
        let manager = ConfigManager::from_settings(Settings::default());
        assert_eq!(manager.notices().len(), 1);
        assert!(manager.notices()[0].contains("auth.token_secret"));

        let mut settings = Settings::default();
        settings.auth.token_secret = Some(SecretString::from("s3cret-value".to_string()));
        assert!(ConfigManager::from_settings(settings).notices().is_empty());
    }

    #[test]
    fn production_requires_a_secret() {
        let mut settings = Settings::default();
        settings.env = "production".into();
        assert!(settings.validate().is_err());
        settings.auth.token_secret = Some(SecretString::from("prod-secret".to_string()));
        assert!(settings.validate().is_ok());
    }
}
