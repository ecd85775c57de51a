use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::StagerError;
use crate::input::DEFAULT_ID_COLUMN;
use crate::oa::{HttpSettings, OA_SERVICE_URL};

pub const DEFAULT_CONFIG_FILE: &str = "guideline-stager.json";
pub const DEFAULT_OUTPUT_DIR: &str = "guidelines";
pub const DEFAULT_DELAY_MS: u64 = 340;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// On-disk form of `guideline-stager.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub metadata_endpoint: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_dir: Utf8PathBuf,
    pub id_column: String,
    pub delay: Duration,
    pub http: HttpSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads an explicit config path, or `guideline-stager.json` from the
    /// working directory when it exists. Without either, defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, StagerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Self::resolve_config(Config::default()));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| StagerError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| StagerError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path.display(), "loaded config");

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            output_dir: Utf8PathBuf::from(
                config
                    .output_dir
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
            id_column: config
                .id_column
                .unwrap_or_else(|| DEFAULT_ID_COLUMN.to_string()),
            delay: Duration::from_millis(config.delay_ms.unwrap_or(DEFAULT_DELAY_MS)),
            http: HttpSettings {
                endpoint: config
                    .metadata_endpoint
                    .unwrap_or_else(|| OA_SERVICE_URL.to_string()),
                timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
                max_retries: config.max_retries.unwrap_or(0),
            },
        }
    }
}
