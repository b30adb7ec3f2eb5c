//! `opindex.toml` settings file.
//!
//! ```toml
//! [node]
//! host = "127.0.0.1"
//! port = 8332
//! user = "rpcuser"
//! password = "rpcpassword"
//!
//! [store]
//! backend = "postgres"
//! database = "op_return"
//!
//! [index]
//! start_height = 1
//! monitor_interval_ms = 10000
//!
//! [server]
//! port = 3000
//!
//! [log]
//! level = "info"
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use opindex_core::IndexerConfig;
use opindex_rpc::NodeConfig;
use opindex_storage::StoreConfig;
use serde::{Deserialize, Serialize};

/// Settings file looked up in the working directory when `--config` is absent.
pub const DEFAULT_SETTINGS_FILE: &str = "opindex.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub node: NodeConfig,
    pub store: StoreConfig,
    pub index: IndexerConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

fn default_server_host() -> String {
    "0.0.0.0".into()
}
fn default_server_port() -> u16 {
    3000
}

/// Query endpoint listen address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Log level and format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from `opindex.toml` if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None if Path::new(DEFAULT_SETTINGS_FILE).exists() => Path::new(DEFAULT_SETTINGS_FILE),
            None => return Ok(Self::default()),
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read settings file '{}'", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("invalid settings file '{}'", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.index.validate()?;
        Ok(settings)
    }
}
