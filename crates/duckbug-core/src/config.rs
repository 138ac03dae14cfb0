use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::filter::Page;
use crate::error::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DUCKBUG_CONFIG";
/// Environment variable overriding the store path.
pub const DB_ENV: &str = "DUCKBUG_DB";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file; falls back to the user data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl ListingConfig {
    /// Page for a listing request, filling in the default limit and capping
    /// at `max_limit`.
    #[must_use]
    pub fn page(&self, limit: Option<u32>, offset: Option<u32>) -> Page {
        Page::new(limit.unwrap_or(self.default_limit), offset.unwrap_or(0))
            .clamped(self.max_limit)
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `DUCKBUG_LOG` is unset.
    #[serde(default)]
    pub level: Option<String>,
    /// `json` or `compact`.
    #[serde(default)]
    pub format: Option<String>,
}

/// Load engine config.
///
/// Lookup order: `explicit` path, then `$DUCKBUG_CONFIG`, then
/// `<config dir>/duckbug/config.toml`. An explicitly named file must exist;
/// a missing default file yields defaults.
///
/// # Errors
///
/// Returns an error if a named file is missing, or any file cannot be read
/// or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

    if let Some(path) = named {
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
        return read_config(&path);
    }

    match default_config_path() {
        Some(path) if path.exists() => read_config(&path),
        _ => Ok(EngineConfig::default()),
    }
}

/// `<config dir>/duckbug/config.toml`, when the platform has a config dir.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("duckbug").join("config.toml"))
}

fn read_config(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EngineConfig>(&content).map_err(|err| {
        Error::Config {
            path: path.to_path_buf(),
            message: err.message().to_string(),
        }
        .into()
    })
}

/// Store path with precedence: CLI flag, `$DUCKBUG_DB`, config, then the
/// user data directory (or `./duckbug.sqlite3` when there is none).
#[must_use]
pub fn resolve_store_path(config: &StoreConfig, cli_db: Option<&Path>) -> PathBuf {
    resolve_store_path_inner(
        cli_db,
        env::var_os(DB_ENV).map(PathBuf::from),
        config.path.as_deref(),
        dirs::data_dir(),
    )
}

fn resolve_store_path_inner(
    cli_db: Option<&Path>,
    env_db: Option<PathBuf>,
    config_path: Option<&Path>,
    data_dir: Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = cli_db {
        return path.to_path_buf();
    }
    if let Some(path) = env_db.filter(|p| !p.as_os_str().is_empty()) {
        return path;
    }
    if let Some(path) = config_path {
        return path.to_path_buf();
    }
    data_dir.map_or_else(
        || PathBuf::from("duckbug.sqlite3"),
        |dir| dir.join("duckbug").join("duckbug.sqlite3"),
    )
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_limit() -> u32 {
    Page::DEFAULT_LIMIT
}

const fn default_max_limit() -> u32 {
    1_000
}
