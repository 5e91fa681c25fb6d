//! Local CLI configuration.
//!
//! A TOML document holding named contexts, each pointing at one deployment
//! of the control plane. The whole document is read, modified and written
//! back; there is no locking.
use crate::write::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "CF_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no contexts are configured; set --api-url or add a context to the config file")]
    NoContexts,

    #[error("context '{0}' was not found in the config file")]
    MissingContext(String),

    #[error("could not determine the home directory; set {CONFIG_ENV}")]
    NoHome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub auth_url: String,
    #[serde(default)]
    pub token_url: String,
    #[serde(default)]
    pub dashboard_url: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub current_context: String,
    #[serde(default, rename = "context")]
    pub contexts: BTreeMap<String, Context>,
}

impl Config {
    /// `$CF_CONFIG`, falling back to `~/.cf/config`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(".cf").join("config"))
            .ok_or(ConfigError::NoHome)
    }

    /// Reads the config file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        atomic_write(path, content.as_bytes()).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn current(&self) -> Result<&Context, ConfigError> {
        if self.contexts.is_empty() {
            return Err(ConfigError::NoContexts);
        }
        self.contexts
            .get(&self.current_context)
            .ok_or_else(|| ConfigError::MissingContext(self.current_context.clone()))
    }

    /// Inserts or replaces a context and makes it current.
    pub fn set_context(&mut self, name: impl Into<String>, context: Context) {
        let name = name.into();
        self.contexts.insert(name.clone(), context);
        self.current_context = name;
    }
}
