//! CLI configuration utilities

use anyhow::Result;
use distributech_core::ClientConfig;
use distributech_core::config::TOKEN_FILE_NAME;
use std::path::{Path, PathBuf};

/// Load the client configuration and apply command-line overrides
///
/// `--data-dir` moves the token file into that directory.
pub fn resolve(
    config_file: Option<&Path>,
    api_url: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(config_file)?;
    apply_overrides(&mut config, api_url, data_dir);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut ClientConfig, api_url: Option<String>, data_dir: Option<PathBuf>) {
    if let Some(api_url) = api_url {
        config.api_url = api_url;
    }
    if let Some(data_dir) = data_dir {
        config.token_file = Some(data_dir.join(TOKEN_FILE_NAME));
    }
}
