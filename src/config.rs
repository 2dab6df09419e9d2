use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::app::FailurePolicy;
use crate::domain::Sources;
use crate::error::PrepError;

pub const DEFAULT_CONFIG_FILE: &str = "upar-datasets.json";
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_TEMPLATES_DIR: &str = ".";
pub const DEFAULT_PETA_MAPPING: &str = "peta_file_mapping.txt";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub templates_dir: Option<String>,
    #[serde(default)]
    pub peta_mapping: Option<String>,
    #[serde(default)]
    pub keep_going: Option<bool>,
    #[serde(default)]
    pub sources: SourceOverrides,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SourceOverrides {
    #[serde(default)]
    pub market1501: Option<String>,
    #[serde(default)]
    pub pa100k: Option<String>,
    #[serde(default)]
    pub peta: Option<String>,
    #[serde(default)]
    pub annotations: Option<String>,
    #[serde(default)]
    pub templates: Option<String>,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub data_dir: Option<String>,
    pub templates_dir: Option<String>,
    pub peta_mapping: Option<String>,
    pub keep_going: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: Utf8PathBuf,
    pub templates_dir: Utf8PathBuf,
    pub peta_mapping: Utf8PathBuf,
    pub policy: FailurePolicy,
    pub sources: Sources,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: CliOverrides,
    ) -> Result<ResolvedConfig, PrepError> {
        let config = Self::load(path)?;
        Self::resolve_config(config, overrides)
    }

    /// Reads the config file. The default file is optional; an explicitly
    /// named one must exist.
    pub fn load(path: Option<&str>) -> Result<Config, PrepError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PrepError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| PrepError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(
        config: Config,
        overrides: CliOverrides,
    ) -> Result<ResolvedConfig, PrepError> {
        let pick = |cli: Option<String>, file: Option<String>, default: &str| {
            Utf8PathBuf::from(cli.or(file).unwrap_or_else(|| default.to_string()))
        };

        let mut sources = Sources::builtin()?;
        let source_overrides = config.sources;
        if let Some(url) = source_overrides.market1501 {
            sources.market1501 = url.parse()?;
        }
        if let Some(url) = source_overrides.pa100k {
            sources.pa100k = url.parse()?;
        }
        if let Some(url) = source_overrides.peta {
            sources.peta = url;
        }
        if let Some(url) = source_overrides.annotations {
            sources.annotations = url.parse()?;
        }
        if let Some(url) = source_overrides.templates {
            sources.templates = url.parse()?;
        }

        let keep_going = overrides.keep_going || config.keep_going.unwrap_or(false);

        Ok(ResolvedConfig {
            data_dir: pick(overrides.data_dir, config.data_dir, DEFAULT_DATA_DIR),
            templates_dir: pick(
                overrides.templates_dir,
                config.templates_dir,
                DEFAULT_TEMPLATES_DIR,
            ),
            peta_mapping: pick(
                overrides.peta_mapping,
                config.peta_mapping,
                DEFAULT_PETA_MAPPING,
            ),
            policy: if keep_going {
                FailurePolicy::Continue
            } else {
                FailurePolicy::Abort
            },
            sources,
        })
    }
}
