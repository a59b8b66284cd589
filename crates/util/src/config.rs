//! User configuration for Tether.
//!
//! A small JSON document (`~/.config/tether/config.json` on most platforms)
//! that customizes the sensitive key set, the runtime placeholder names, and
//! where the provider and selection stores live. Every field is optional; a
//! missing or malformed file yields the defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Environment variable allowing callers to override the config file path.
pub const CONFIG_PATH_ENV: &str = "TETHER_CONFIG_PATH";
/// Environment variable overriding the custom provider store path.
pub const PROVIDERS_PATH_ENV: &str = "TETHER_PROVIDERS_PATH";
/// Environment variable overriding the selection store path.
pub const SELECTION_PATH_ENV: &str = "TETHER_SELECTION_PATH";
/// Environment variable selecting where credential values are kept.
pub const SECRETS_BACKEND_ENV: &str = "TETHER_SECRETS_BACKEND";

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const PROVIDERS_FILE_NAME: &str = "providers.json";
pub const SELECTION_FILE_NAME: &str = "selection.json";

/// Where sensitive override values are kept.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretsBackend {
    /// Inline in the selection store file (mode 0600).
    #[default]
    File,
    /// In the OS keychain; the selection file only holds references.
    Keychain,
}

impl SecretsBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Some(Self::File),
            "keychain" => Some(Self::Keychain),
            _ => None,
        }
    }
}

/// Error surfaced when the configuration file exists but cannot be read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persisted configuration values.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetherConfig {
    /// Replaces the built-in set of credential key names when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive_keys: Option<Vec<String>>,
    /// Replaces the built-in set of runtime placeholder names when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_placeholders: Option<Vec<String>>,
    /// Location of the custom provider store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers_path: Option<String>,
    /// Location of the selection store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_path: Option<String>,
    /// Where credential values are kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_backend: Option<SecretsBackend>,
}

impl TetherConfig {
    /// Load the configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&default_config_path())
    }

    /// Load the configuration from `path`.
    ///
    /// A missing file is not an error. A file that fails to parse is logged
    /// and replaced with the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => Ok(config),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Failed to parse config file; using defaults");
                    Ok(Self::default())
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(ConfigError::Io(error)),
        }
    }

    /// Resolved path of the custom provider store.
    ///
    /// Precedence: `TETHER_PROVIDERS_PATH`, then the config file, then the
    /// default config directory.
    pub fn providers_path(&self) -> PathBuf {
        resolve_store_path(PROVIDERS_PATH_ENV, self.providers_path.as_deref(), PROVIDERS_FILE_NAME)
    }

    /// Resolved path of the selection store.
    pub fn selection_path(&self) -> PathBuf {
        resolve_store_path(SELECTION_PATH_ENV, self.selection_path.as_deref(), SELECTION_FILE_NAME)
    }

    /// Resolved secrets backend: `TETHER_SECRETS_BACKEND`, then the config
    /// file, then [`SecretsBackend::File`]. An unknown env value is ignored.
    pub fn secrets_backend(&self) -> SecretsBackend {
        if let Ok(raw) = env::var(SECRETS_BACKEND_ENV) {
            match SecretsBackend::parse(&raw) {
                Some(backend) => return backend,
                None => warn!(value = %raw, "Unknown {SECRETS_BACKEND_ENV} value; ignoring"),
            }
        }
        self.secrets_backend.unwrap_or_default()
    }
}

/// Directory holding all Tether files.
pub fn tether_config_dir() -> PathBuf {
    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("tether")
}

/// Get the default path for the configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    tether_config_dir().join(CONFIG_FILE_NAME)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let home = || home_dir().unwrap_or_else(|| PathBuf::from("~"));
    if trimmed == "~" {
        return home();
    }
    if let Some(rest) = trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")) {
        return home().join(rest);
    }
    PathBuf::from(trimmed)
}

fn resolve_store_path(env_var: &str, configured: Option<&str>, file_name: &str) -> PathBuf {
    if let Ok(path) = env::var(env_var)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }
    if let Some(path) = configured
        && !path.trim().is_empty()
    {
        return expand_tilde(path);
    }
    tether_config_dir().join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = TetherConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, TetherConfig::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();
        assert_eq!(TetherConfig::load_from(&path).unwrap(), TetherConfig::default());
    }

    #[test]
    fn reads_sensitive_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"sensitive_keys": ["api_key", "x_token"]}"#).unwrap();
        let config = TetherConfig::load_from(&path).unwrap();
        assert_eq!(config.sensitive_keys, Some(vec!["api_key".to_string(), "x_token".to_string()]));
    }

    #[test]
    fn env_override_beats_configured_path() {
        let config = TetherConfig {
            providers_path: Some("/from/config/providers.json".into()),
            ..TetherConfig::default()
        };
        temp_env::with_var(PROVIDERS_PATH_ENV, Some("/from/env/providers.json"), || {
            assert_eq!(config.providers_path(), PathBuf::from("/from/env/providers.json"));
        });
        temp_env::with_var(PROVIDERS_PATH_ENV, None::<&str>, || {
            assert_eq!(config.providers_path(), PathBuf::from("/from/config/providers.json"));
        });
    }

    #[test]
    fn default_config_path_honors_env_override() {
        temp_env::with_var(CONFIG_PATH_ENV, Some("~/custom/config.json"), || {
            assert_eq!(default_config_path(), expand_tilde("~/custom/config.json"));
        });
    }

    #[test]
    fn selection_path_falls_back_to_config_dir() {
        temp_env::with_var(SELECTION_PATH_ENV, None::<&str>, || {
            let path = TetherConfig::default().selection_path();
            assert!(path.ends_with("tether/selection.json"));
        });
    }

    #[test]
    fn secrets_backend_precedence() {
        let config: TetherConfig = serde_json::from_str(r#"{"secrets_backend": "keychain"}"#).unwrap();
        temp_env::with_var(SECRETS_BACKEND_ENV, None::<&str>, || {
            assert_eq!(config.secrets_backend(), SecretsBackend::Keychain);
            assert_eq!(TetherConfig::default().secrets_backend(), SecretsBackend::File);
        });
        temp_env::with_var(SECRETS_BACKEND_ENV, Some("FILE"), || {
            assert_eq!(config.secrets_backend(), SecretsBackend::File);
        });
        temp_env::with_var(SECRETS_BACKEND_ENV, Some("vault"), || {
            assert_eq!(config.secrets_backend(), SecretsBackend::Keychain);
        });
    }
}
