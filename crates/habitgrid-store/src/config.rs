//! Store configuration.
//!
//! Provides a TOML config file at `~/.config/habitgrid/config.toml` and a
//! resolution chain for the data directory:
//! CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "HABITGRID_DATA_DIR";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub oracle: OracleSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StorageSection {
    /// Data directory for all documents.
    pub data_dir: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OracleSection {
    /// Program spawned for generation requests.
    pub program: String,
    /// Fixed arguments passed on every invocation.
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["-p".to_string()],
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// The habitgrid config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/habitgrid` or
/// `~/.config/habitgrid`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("habitgrid");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("habitgrid")
}

/// Path to the habitgrid config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default data directory: `$XDG_DATA_HOME/habitgrid` or
/// `~/.local/share/habitgrid`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("habitgrid");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("habitgrid")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub oracle_program: String,
    pub oracle_args: Vec<String>,
    pub oracle_timeout_secs: u64,
}

impl StoreConfig {
    /// Resolve using the chain: CLI flag > env var > config file > default.
    /// A missing config file is fine; its sections just drop out of the
    /// chain.
    pub fn resolve(data_dir_flag: Option<&str>) -> Self {
        let file = load_config().unwrap_or_default();

        let data_dir = data_dir_flag
            .map(PathBuf::from)
            .or_else(|| std::env::var(DATA_DIR_ENV).ok().map(PathBuf::from))
            .or_else(|| file.storage.data_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        Self {
            data_dir,
            oracle_program: file.oracle.program,
            oracle_args: file.oracle.args,
            oracle_timeout_secs: file.oracle.timeout_secs,
        }
    }

    /// A config rooted at an explicit directory, for tests.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            oracle_program: OracleSection::default().program,
            oracle_args: OracleSection::default().args,
            oracle_timeout_secs: default_timeout_secs(),
        }
    }
}
