//! mindmap/crates/configs/src/lib.rs
//!
//! Layered runtime settings for the map server.
//!
//! Sources, lowest precedence first:
//! 1. Compiled defaults
//! 2. `config/default.toml` (optional)
//! 3. The file named by `MINDMAP_CONFIG` (optional)
//! 4. Environment variables: `MINDMAP__<SECTION>__<KEY>`, e.g. `MINDMAP__SERVER__PORT`
//!
//! A `.env` file is loaded into the process environment before any of this.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Environment variable naming an extra settings file.
pub const CONFIG_FILE_VAR: &str = "MINDMAP_CONFIG";

const ENV_PREFIX: &str = "MINDMAP";
const DEFAULT_FILE: &str = "config/default.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Largest accepted `.mind` upload, in bytes
    pub max_upload_bytes: usize,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// e.g. `sqlite://mindmap.db` or `sqlite::memory:`
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Parent of per-import work directories
    pub scratch_dir: PathBuf,
    /// Parent of per-export archive files
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info,sqlx=warn`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Settings {
    /// Loads `.env`, then every source in precedence order.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }

        let mut files = vec![PathBuf::from(DEFAULT_FILE)];
        if let Ok(extra) = std::env::var(CONFIG_FILE_VAR) {
            files.push(PathBuf::from(extra));
        }
        Self::from_sources(&files, None)
    }

    /// Builds settings from the given files (later wins) and the environment.
    ///
    /// `env` replaces the process environment when given.
    pub fn from_sources(files: &[PathBuf], env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let scratch_root = std::env::temp_dir().join("mindmap");
        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("database.url", "sqlite://mindmap.db")?
            .set_default("database.max_connections", 5)?
            .set_default("storage.scratch_dir", path_string(&scratch_root.join("scratch")))?
            .set_default("storage.export_dir", path_string(&scratch_root.join("exports")))?
            .set_default("log.filter", "info")?
            .set_default("log.json", false)?;

        for file in files {
            builder = builder.add_source(File::from(file.as_path()).required(false));
        }

        let mut environment = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true);
        if let Some(vars) = env {
            environment = environment.source(Some(vars.into_iter().collect()));
        }

        let settings: Self = builder.add_source(environment).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                key: "server.port",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "server.max_upload_bytes",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "database.max_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
