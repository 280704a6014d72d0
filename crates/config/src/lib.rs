//! User settings
//!
//! Settings live in `config.toml` under the platform configuration directory, e.g.
//! `~/.config/dap-bridge/config.toml` on Linux:
//!
//! ```toml
//! [session]
//! adapter_id = "dap-bridge"
//! configuration_done_delay_ms = 500
//! disconnect_timeout_ms = 2000
//!
//! [runtime]
//! launcher = "/usr/bin/mono"
//! ```
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const APP_DIRECTORY: &str = "dap-bridge";
const FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub session: SessionConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Sent as `adapterID` in the `initialize` request
    pub adapter_id: String,
    /// Pause between `launch` and `configurationDone`, giving other requests (breakpoints)
    /// a chance to reach the adapter first
    pub configuration_done_delay_ms: u64,
    pub disconnect_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            adapter_id: "dap-bridge".to_string(),
            configuration_done_delay_ms: 500,
            disconnect_timeout_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn configuration_done_delay(&self) -> Duration {
        Duration::from_millis(self.configuration_done_delay_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Runtime used to start adapters that are not native executables. May start
    /// with `~`.
    pub launcher: Option<PathBuf>,
}

/// Location of the settings file, if the platform has a configuration directory
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIRECTORY).join(FILE_NAME))
}

impl Config {
    /// Load settings from the default location, falling back to defaults if there is no file
    pub fn load() -> Result<Self, ConfigError> {
        match default_path() {
            Some(path) => Self::load_or_default(&path),
            None => {
                tracing::debug!("no configuration directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load settings from `path`, which may not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        Self::from_path(path)
    }

    /// Load settings from `path`, which must exist
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), ?config, "loaded settings");
        Ok(config)
    }
}
