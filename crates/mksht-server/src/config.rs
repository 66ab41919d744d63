//! Configuration file loading.
//!
//! The file is JSON or TOML, chosen by extension. Relative workspace roots
//! are resolved against the directory the file was loaded from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mksht_services::ExecutorRule;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Locations probed, in order, when no configuration path is given.
pub const SEARCH_PATHS: &[&str] = &[
    "./makeshiftd.toml",
    "./makeshiftd.json",
    "~/.makeshiftd.toml",
    "~/.makeshiftd.json",
    "/etc/makeshiftd.toml",
    "/etc/makeshiftd.json",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration file found (tried: {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unsupported configuration format: {0} (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),

    #[error("Duplicate workspace slug: {0}")]
    DuplicateSlug(String),

    #[error("Workspace {name}: root {path} is not a directory")]
    InvalidRoot { name: String, path: PathBuf },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind; empty means all interfaces.
    pub host: String,
    pub port: u16,
    pub grace_period_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8080,
            grace_period_secs: 30,
        }
    }
}

impl ServerConfig {
    /// `host:port` suitable for binding a listener.
    pub fn bind_address(&self) -> String {
        let host = if self.host.is_empty() { "0.0.0.0" } else { &self.host };
        format!("{host}:{}", self.port)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Workspace name → root directory.
    pub workspaces: BTreeMap<String, PathBuf>,
    /// Extra executor rules, consulted before the built-in ones.
    pub executors: Vec<ExecutorRule>,
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl AppConfig {
    /// Load `path`, or the first existing [`SEARCH_PATHS`] entry when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => find_config()?,
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            Some("toml") => toml::from_str(&text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        debug!("Loaded configuration from {}", path.display());
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// File this configuration was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Directory relative workspace roots are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.source
            .as_deref()
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Configured rules followed by the built-in table.
    pub fn executor_rules(&self) -> Vec<ExecutorRule> {
        self.executors
            .iter()
            .cloned()
            .chain(mksht_services::exec::default_rules())
            .collect()
    }
}

/// First existing candidate from [`SEARCH_PATHS`].
pub fn find_config() -> Result<PathBuf, ConfigError> {
    find_in(SEARCH_PATHS)
}

fn find_in(candidates: &[&str]) -> Result<PathBuf, ConfigError> {
    let mut attempted = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let path = expand_path(candidate);
        if path.is_file() {
            return Ok(path);
        }
        attempted.push(path);
    }
    Err(ConfigError::NotFound(attempted))
}

/// Expand `~`, `$VAR` and `${VAR}`; unknown variables are left as written.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded =
        shellexpand::full_with_context_no_errors(
            raw,
            || dirs::home_dir().map(|p| p.to_string_lossy().into_owned()),
            |var| std::env::var(var).ok());
    PathBuf::from(expanded.as_ref())
}
