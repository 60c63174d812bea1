// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration module

use crate::http::cache::DEFAULT_IDLE_TTL;
use crate::http::certs::CertificateStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = ".relayx/config.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub certificates: CertificateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_true")]
    pub cors: bool,

    /// Largest accepted options document, in bytes
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors: true,
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a client may sit unused before eviction
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,
}

fn default_bind() -> String {
    "127.0.0.1:5298".to_string()
}

fn default_max_request_bytes() -> usize {
    30 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_idle_ttl_secs() -> u64 {
    DEFAULT_IDLE_TTL.as_secs()
}

impl Config {
    /// Load configuration from `path`, or from .relayx/config.toml when present
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let resolved = resolve_env_vars(&content)?;
        toml::from_str(&resolved)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.idle_ttl_secs)
    }

    pub fn certificate_store_dir(&self) -> PathBuf {
        self.certificates
            .store_dir
            .clone()
            .or_else(CertificateStore::default_location)
            .unwrap_or_else(|| PathBuf::from(".relayx/certs/my"))
    }
}

/// Resolve ${VAR} references to environment variables
fn resolve_env_vars(value: &str) -> Result<String> {
    let mut result = value.to_string();

    // Match ${VAR_NAME} pattern
    let re = regex::Regex::new(r"\$\{([^}]+)\}")?;

    for cap in re.captures_iter(value) {
        let var_name = &cap[1];
        let full_match = &cap[0];

        if let Ok(env_value) = std::env::var(var_name) {
            result = result.replace(full_match, &env_value);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("RELAYX_TEST_VAR", "hello");
        let result = resolve_env_vars("${RELAYX_TEST_VAR} world ${RELAYX_UNSET_VAR}").unwrap();
        assert_eq!(result, "hello world ${RELAYX_UNSET_VAR}");
        std::env::remove_var("RELAYX_TEST_VAR");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:5298");
        assert!(config.server.cors);
        assert_eq!(config.server.max_request_bytes, 31_457_280);
        assert_eq!(config.idle_ttl(), Duration::from_secs(7 * 24 * 60 * 60));
    }

    #[test]
    fn test_load_from_file() {
        std::env::set_var("RELAYX_TEST_STORE", "/srv/certs");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:8080"
cors = false
max_request_bytes = 1024

[cache]
idle_ttl_secs = 60

[certificates]
store_dir = "${RELAYX_TEST_STORE}/my"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(!config.server.cors);
        assert_eq!(config.server.max_request_bytes, 1024);
        assert_eq!(config.idle_ttl(), Duration::from_secs(60));
        assert_eq!(config.certificate_store_dir(), PathBuf::from("/srv/certs/my"));
        std::env::remove_var("RELAYX_TEST_STORE");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/no/such/relayx.toml"))).is_err());
    }
}
