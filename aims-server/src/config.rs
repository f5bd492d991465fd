use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// Name of the SQLite database file inside `STATE_DIR`.
pub const DATABASE_FILE: &str = "aims-state.db";

/// Which repository backend to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub storage: StorageBackend,
    /// Optional bearer token for the `/api` routes.
    /// If set, every `/api` request must include `Authorization: Bearer <token>`.
    pub api_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let storage = parse_storage_backend(env::var("AIMS_STORAGE").ok())
            .context("AIMS_STORAGE must be `sqlite` or `memory`")?;

        let api_token = parse_api_token(env::var("AIMS_API_TOKEN").ok());

        Ok(Config {
            port,
            state_dir,
            storage,
            api_token,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}

/// Parse AIMS_STORAGE; unset or blank selects SQLite.
pub fn parse_storage_backend(value: Option<String>) -> Result<StorageBackend> {
    let Some(value) = value.filter(|s| !s.trim().is_empty()) else {
        return Ok(StorageBackend::Sqlite);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "sqlite" => Ok(StorageBackend::Sqlite),
        "memory" => Ok(StorageBackend::Memory),
        other => bail!("unknown storage backend `{}`", other),
    }
}

/// Parse AIMS_API_TOKEN from an optional string value.
///
/// Returns None if the value is missing, empty, or contains only whitespace,
/// so a blank token never turns into "any empty bearer is accepted".
pub fn parse_api_token(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
