use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::env;
use config; // Explicitly import the config crate

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Populated from the .env file.
    pub database_path: String,
    pub log_level: String,
    // Populated from config/default.toml.
    pub default_page_size: u64,
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        // Load the specified .env file. Propagate an error if it fails.
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        let database_path = env::var("DATABASE_PATH")
            .map_err(|_| config::ConfigError::Message(
                "FATAL: Environment variable 'DATABASE_PATH' is not set in your .env file.".to_string()
            ))?;

        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let builder = config::Config::builder()
            // Base settings (pagination defaults) come from the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("log_level", log_level)?
            .build()?;

        let cfg: Config = builder.try_deserialize()?;

        if cfg.default_page_size == 0 {
            return Err(config::ConfigError::Message(
                "FATAL: 'default_page_size' must be at least 1.".to_string()
            ));
        }

        Ok(cfg)
    }

    /// Returns the full path to the posts database file inside its own folder.
    pub fn posts_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("posts")
            .join("posts.db")
    }

    /// Returns the full path to the labels database file inside its own folder.
    pub fn labels_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("labels")
            .join("labels.db")
    }
}
