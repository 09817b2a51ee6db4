//! # Service Configuration
//!
//! Settings are layered: built-in defaults, then an optional JSON file, then
//! the API key from the environment, then command-line flags.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uflags_core::{FlagError, ModuleParams};

/// Default management endpoint address.
pub const DEFAULT_LISTEN: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080));

/// Environment variable holding the management API key.
pub const API_KEY_ENV: &str = "UFLAGS_API_KEY";

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid module parameter: {0}")]
    Param(#[from] FlagError),
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Address of the HTTP management endpoint.
    pub listen: SocketAddr,
    /// Bearer token required on `/mi/*`. `None` disables authentication.
    pub api_key: Option<String>,
    /// Route script run once right after the registry is allocated.
    pub startup_route: Option<PathBuf>,
    /// Module parameters.
    pub params: ModuleParams,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN,
            api_key: None,
            startup_route: None,
            params: ModuleParams::default(),
        }
    }
}

impl ServiceConfig {
    /// Read a JSON config file.
    ///
    /// An empty `api_key` counts as unset.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.api_key = non_empty(config.api_key.take());
        Ok(config)
    }

    /// Read a JSON config file if one is given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(mut self, overrides: &Overrides) -> Result<Self, ConfigError> {
        if let Some(listen) = overrides.listen {
            self.listen = listen;
        }
        if let Some(initial) = &overrides.initial {
            self.params.apply("initial", initial)?;
        }
        if let Some(path) = &overrides.startup_route {
            self.startup_route = Some(path.clone());
        }
        if let Some(key) = non_empty(overrides.api_key.clone()) {
            self.api_key = Some(key);
        }
        Ok(self)
    }

    /// Take the API key from the environment when it is set and non-empty.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_api_key_from(std::env::var(API_KEY_ENV).ok())
    }

    fn with_api_key_from(mut self, value: Option<String>) -> Self {
        if let Some(key) = non_empty(value) {
            self.api_key = Some(key);
        }
        self
    }
}

/// An empty API key never enables authentication.
pub(crate) fn non_empty(key: Option<String>) -> Option<String> {
    key.filter(|key| !key.is_empty())
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub initial: Option<String>,
    pub startup_route: Option<PathBuf>,
    pub api_key: Option<String>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.listen.to_string(), "127.0.0.1:8080");
        assert_eq!(config.params.initial, 0);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Result<ServiceConfig, _> =
            serde_json::from_str(r#"{"params": {"initial": 5}}"#);
        let config = config.unwrap_or_default();
        assert_eq!(config.params.initial, 5);
        assert_eq!(config.listen, DEFAULT_LISTEN);
    }

    #[test]
    fn overrides_win_over_file() {
        let overrides = Overrides {
            listen: "0.0.0.0:9000".parse().ok(),
            initial: Some("7".to_string()),
            ..Overrides::default()
        };
        let config = ServiceConfig::default().apply_overrides(&overrides);
        let config = config.unwrap_or_default();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.params.initial, 7);
    }

    #[test]
    fn bad_initial_override_is_rejected() {
        let overrides = Overrides {
            initial: Some("seven".to_string()),
            ..Overrides::default()
        };
        let result = ServiceConfig::default().apply_overrides(&overrides);
        assert!(matches!(result, Err(ConfigError::Param(_))));
    }

    #[test]
    fn empty_override_key_is_ignored() {
        let overrides = Overrides {
            api_key: Some(String::new()),
            ..Overrides::default()
        };
        let config = ServiceConfig::default().apply_overrides(&overrides);
        assert!(config.unwrap_or_default().api_key.is_none());
    }

    #[test]
    fn empty_env_key_is_ignored() {
        let config = ServiceConfig::default().with_api_key_from(Some(String::new()));
        assert!(config.api_key.is_none());

        let config = ServiceConfig::default().with_api_key_from(Some("secret".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }
}
