//! Client configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `DISTRIBUTECH_*` environment variables.

use crate::error::{CoreError, CoreResult};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// API root used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "DISTRIBUTECH";

/// Name of the persisted token file inside the data directory
pub const TOKEN_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST API, including the `/api` prefix
    pub api_url: String,
    /// Request timeout in seconds, 0 disables it
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Where tokens are persisted; `None` keeps them in memory only
    pub token_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
            user_agent: format!("distributech-client/{}", env!("CARGO_PKG_VERSION")),
            token_file: Some(default_data_dir().join(TOKEN_FILE_NAME)),
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from an optional file plus the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result is invalid
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// Load configuration with an explicit environment source
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result is invalid
    pub fn load_with_env(path: Option<&Path>, env: Environment) -> CoreResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading client configuration file");
            builder = builder.add_source(File::from(path));
        }

        let settings = builder.add_source(env.try_parsing(true)).build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the API URL is usable
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a malformed or non-HTTP URL
    pub fn validate(&self) -> CoreResult<()> {
        let url = url::Url::parse(&self.api_url)
            .map_err(|e| CoreError::invalid_config(format!("api_url {:?}: {e}", self.api_url)))?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(CoreError::invalid_config(format!(
                "api_url must use http or https, got {scheme}"
            ))),
        }
    }

    /// API root with no trailing slash
    pub fn api_root(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Platform data directory for persisted client state
pub fn default_data_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("com", "DistribuTech", "distributech") {
        dirs.data_dir().to_path_buf()
    } else {
        warn!("Failed to determine platform-specific directories, using ./data");
        PathBuf::from("./data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert!(config.token_file.is_some());
    }

    #[test]
    fn test_environment_overrides() {
        let config = ClientConfig::load_with_env(
            None,
            env(&[
                ("DISTRIBUTECH_API_URL", "https://erp.example.com/api/"),
                ("DISTRIBUTECH_TIMEOUT_SECS", "0"),
            ]),
        )
        .unwrap();

        assert_eq!(config.api_root(), "https://erp.example.com/api");
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(
            &path,
            "api_url = \"http://file.example:8000/api\"\nlog_level = \"debug\"\n",
        )
        .unwrap();

        let config = ClientConfig::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(config.api_url, "http://file.example:8000/api");
        assert_eq!(config.log_level, "debug");

        let config = ClientConfig::load_with_env(
            Some(&path),
            env(&[("DISTRIBUTECH_LOG_LEVEL", "warn")]),
        )
        .unwrap();
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = ClientConfig::load_with_env(
            None,
            env(&[("DISTRIBUTECH_API_URL", "ftp://example.com")]),
        );
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));

        let result =
            ClientConfig::load_with_env(None, env(&[("DISTRIBUTECH_API_URL", "not a url")]));
        assert!(result.is_err());
    }
}
