use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{ProfileId, TdrEnvironment};
use crate::error::OpsError;

pub const CONFIG_FILE: &str = "terra-ops.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tdr: TdrUrls,
    #[serde(default)]
    pub firecloud_url: Option<String>,
    #[serde(default)]
    pub gcs_url: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub upsert_batch_size: Option<usize>,
    #[serde(default)]
    pub ingest_batch_size: Option<usize>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub billing_profile: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TdrUrls {
    #[serde(default)]
    pub prod_url: Option<String>,
    #[serde(default)]
    pub dev_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub tdr_prod_url: String,
    pub tdr_dev_url: String,
    pub firecloud_url: String,
    pub gcs_url: String,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub max_retries: usize,
    pub upsert_batch_size: usize,
    pub ingest_batch_size: usize,
    pub workers: usize,
    pub billing_profile: Option<ProfileId>,
}

impl ResolvedConfig {
    pub fn tdr_url(&self, env: TdrEnvironment) -> &str {
        match env {
            TdrEnvironment::Prod => &self.tdr_prod_url,
            TdrEnvironment::Dev => &self.tdr_dev_url,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path` when given, otherwise `./terra-ops.json`, otherwise the
    /// user config directory. No file at all yields the defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, OpsError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            return Self::resolve_config(Config::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| OpsError::ConfigRead(config_path.clone()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|err| OpsError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("bio", "terra", "terra-ops")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, OpsError> {
        let upsert_batch_size = positive("upsert_batch_size", config.upsert_batch_size, 500)?;
        let ingest_batch_size = positive("ingest_batch_size", config.ingest_batch_size, 1000)?;
        let workers = positive("workers", config.workers, 8)?;

        let billing_profile = config
            .billing_profile
            .map(|value| value.parse::<ProfileId>())
            .transpose()?;

        Ok(ResolvedConfig {
            tdr_prod_url: trim_url(config.tdr.prod_url, "https://data.terra.bio"),
            tdr_dev_url: trim_url(
                config.tdr.dev_url,
                "https://jade.datarepo-dev.broadinstitute.org",
            ),
            firecloud_url: trim_url(config.firecloud_url, "https://api.firecloud.org"),
            gcs_url: trim_url(config.gcs_url, "https://storage.googleapis.com"),
            poll_interval: Duration::from_secs(config.poll_interval_secs.unwrap_or(10)),
            http_timeout: Duration::from_secs(config.http_timeout_secs.unwrap_or(60)),
            max_retries: config.max_retries.unwrap_or(3),
            upsert_batch_size,
            ingest_batch_size,
            workers,
            billing_profile,
        })
    }
}

fn positive(key: &str, value: Option<usize>, default: usize) -> Result<usize, OpsError> {
    match value {
        Some(0) => Err(OpsError::ConfigValue(format!("{key} must be greater than zero"))),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn trim_url(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_when_empty() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.tdr_url(TdrEnvironment::Prod), "https://data.terra.bio");
        assert_eq!(resolved.poll_interval, Duration::from_secs(10));
        assert_eq!(resolved.upsert_batch_size, 500);
        assert_eq!(resolved.workers, 8);
        assert!(resolved.billing_profile.is_none());
    }

    #[test]
    fn zero_workers_rejected() {
        let config = Config {
            workers: Some(0),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, OpsError::ConfigValue(_));
    }
}
