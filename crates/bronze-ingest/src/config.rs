//! Runtime configuration
//!
//! Loaded once per task from the environment (and an optional `.env` file)
//! and validated up front, so a bad value fails the task with a configuration
//! error before any network call is made.

use crate::error::{IngestError, Result};
use crate::storage::{s3::MIN_PART_SIZE, StorageConfig};
use crate::transfer::ftp::FtpSettings;
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_SOURCES_CONFIG_PATH: &str = "config/sources.yaml";
pub const DEFAULT_MANIFEST_KEY: &str = "manifest.json";

pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Whole-request budget for artifact downloads, sized for multi-gigabyte files.
pub const DEFAULT_HTTP_DOWNLOAD_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_RESOLVER_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_FTP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_FTP_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_FTP_RETRY_BASE_DELAY_MS: u64 = 2000;
pub const DEFAULT_FTP_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Streaming chunk size, also the multipart part size.
pub const DEFAULT_TRANSFER_CHUNK_SIZE: usize = 8 * 1024 * 1024;

pub const DEFAULT_CONTAINER_WORKDIR: &str = "/app";
pub const DEFAULT_INGEST_BINARY: &str = "bronze-ingest";

pub const DEFAULT_BIOPORTAL_BASE_URL: &str = "https://data.bioontology.org";
pub const DEFAULT_PATHWAY_COMMONS_BASE_URL: &str = "https://download.baderlab.org/PathwayCommons/PC2/";

#[derive(Debug, Clone, Serialize)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub resolver_timeout_secs: u64,
}

impl HttpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver_timeout_secs)
    }
}

/// Execution settings handed to the external task runner.
#[derive(Debug, Clone, Serialize)]
pub struct JobSettings {
    pub container_image: Option<String>,
    pub workdir: String,
    pub binary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BioPortalSettings {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestConfig {
    pub storage: StorageConfig,
    pub sources_path: PathBuf,
    pub manifest_key: String,
    pub http: HttpSettings,
    pub ftp: FtpSettings,
    pub transfer_chunk_size: usize,
    pub jobs: JobSettings,
    pub bioportal: BioPortalSettings,
    pub pathway_commons_base_url: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::from_lookup(|_| None),
            sources_path: PathBuf::from(DEFAULT_SOURCES_CONFIG_PATH),
            manifest_key: DEFAULT_MANIFEST_KEY.to_string(),
            http: HttpSettings {
                connect_timeout_secs: DEFAULT_HTTP_CONNECT_TIMEOUT_SECS,
                download_timeout_secs: DEFAULT_HTTP_DOWNLOAD_TIMEOUT_SECS,
                resolver_timeout_secs: DEFAULT_RESOLVER_TIMEOUT_SECS,
            },
            ftp: FtpSettings::default(),
            transfer_chunk_size: DEFAULT_TRANSFER_CHUNK_SIZE,
            jobs: JobSettings {
                container_image: None,
                workdir: DEFAULT_CONTAINER_WORKDIR.to_string(),
                binary: DEFAULT_INGEST_BINARY.to_string(),
            },
            bioportal: BioPortalSettings {
                base_url: DEFAULT_BIOPORTAL_BASE_URL.to_string(),
                api_key: None,
            },
            pathway_commons_base_url: DEFAULT_PATHWAY_COMMONS_BASE_URL.to_string(),
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IngestError::Config(format!("{key}='{raw}': {e}"))),
        None => Ok(default),
    }
}

impl IngestConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let ftp_defaults = FtpSettings::default();

        let config = Self {
            storage: StorageConfig::from_lookup(&lookup),
            sources_path: lookup("SOURCES_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.sources_path),
            manifest_key: lookup("MANIFEST_KEY").unwrap_or(defaults.manifest_key),
            http: HttpSettings {
                connect_timeout_secs: parsed(
                    &lookup,
                    "HTTP_CONNECT_TIMEOUT_SECS",
                    DEFAULT_HTTP_CONNECT_TIMEOUT_SECS,
                )?,
                download_timeout_secs: parsed(
                    &lookup,
                    "HTTP_DOWNLOAD_TIMEOUT_SECS",
                    DEFAULT_HTTP_DOWNLOAD_TIMEOUT_SECS,
                )?,
                resolver_timeout_secs: parsed(
                    &lookup,
                    "RESOLVER_TIMEOUT_SECS",
                    DEFAULT_RESOLVER_TIMEOUT_SECS,
                )?,
            },
            ftp: FtpSettings {
                timeout: Duration::from_secs(parsed(&lookup, "FTP_TIMEOUT_SECS", DEFAULT_FTP_TIMEOUT_SECS)?),
                max_attempts: parsed(&lookup, "FTP_MAX_ATTEMPTS", DEFAULT_FTP_MAX_ATTEMPTS)?,
                base_delay: Duration::from_millis(parsed(
                    &lookup,
                    "FTP_RETRY_BASE_DELAY_MS",
                    DEFAULT_FTP_RETRY_BASE_DELAY_MS,
                )?),
                chunk_size: parsed(&lookup, "FTP_CHUNK_SIZE", DEFAULT_FTP_CHUNK_SIZE)?,
                ..ftp_defaults
            },
            transfer_chunk_size: parsed(&lookup, "TRANSFER_CHUNK_SIZE", DEFAULT_TRANSFER_CHUNK_SIZE)?,
            jobs: JobSettings {
                container_image: lookup("BRONZE_CONTAINER_IMAGE").filter(|v| !v.is_empty()),
                workdir: lookup("CONTAINER_WORKDIR").unwrap_or(defaults.jobs.workdir),
                binary: lookup("INGEST_BINARY").unwrap_or(defaults.jobs.binary),
            },
            bioportal: BioPortalSettings {
                base_url: lookup("BIOPORTAL_BASE_URL").unwrap_or(defaults.bioportal.base_url),
                api_key: lookup("BIOPORTAL_API_KEY").filter(|v| !v.is_empty()),
            },
            pathway_commons_base_url: lookup("PATHWAY_COMMONS_BASE_URL")
                .unwrap_or(defaults.pathway_commons_base_url),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.bucket.trim().is_empty() {
            return Err(IngestError::Config("S3_BUCKET cannot be empty".into()));
        }
        if self.manifest_key.trim().is_empty() {
            return Err(IngestError::Config("MANIFEST_KEY cannot be empty".into()));
        }
        if self.transfer_chunk_size < MIN_PART_SIZE {
            return Err(IngestError::Config(format!(
                "TRANSFER_CHUNK_SIZE must be at least {MIN_PART_SIZE} bytes"
            )));
        }
        if self.ftp.chunk_size == 0 {
            return Err(IngestError::Config("FTP_CHUNK_SIZE must be greater than 0".into()));
        }
        if self.ftp.max_attempts == 0 {
            return Err(IngestError::Config("FTP_MAX_ATTEMPTS must be at least 1".into()));
        }
        if self.http.connect_timeout_secs == 0
            || self.http.download_timeout_secs == 0
            || self.http.resolver_timeout_secs == 0
            || self.ftp.timeout.is_zero()
        {
            return Err(IngestError::Config("timeouts must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn bioportal_api_key(&self) -> Result<&str> {
        self.bioportal
            .api_key
            .as_deref()
            .ok_or_else(|| IngestError::Config("BIOPORTAL_API_KEY is not set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<IngestConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        IngestConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.sources_path, PathBuf::from(DEFAULT_SOURCES_CONFIG_PATH));
        assert_eq!(config.manifest_key, "manifest.json");
        assert_eq!(config.http.download_timeout(), Duration::from_secs(3600));
        assert_eq!(config.ftp.max_attempts, 5);
        assert_eq!(config.ftp.base_delay, Duration::from_millis(2000));
        assert_eq!(config.transfer_chunk_size, 8 * 1024 * 1024);
        assert_eq!(config.jobs.workdir, "/app");
        assert!(config.bioportal_api_key().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MANIFEST_KEY", "state/manifest.json"),
            ("FTP_MAX_ATTEMPTS", "3"),
            ("HTTP_CONNECT_TIMEOUT_SECS", "5"),
            ("BRONZE_CONTAINER_IMAGE", "registry.example.org/bronze:1.2"),
            ("BIOPORTAL_API_KEY", "secret"),
        ])
        .unwrap();
        assert_eq!(config.manifest_key, "state/manifest.json");
        assert_eq!(config.ftp.max_attempts, 3);
        assert_eq!(config.http.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.jobs.container_image.as_deref(), Some("registry.example.org/bronze:1.2"));
        assert_eq!(config.bioportal_api_key().unwrap(), "secret");
    }

    #[test]
    fn test_malformed_number_is_config_error() {
        let err = load(&[("FTP_MAX_ATTEMPTS", "five")]).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_validation() {
        assert!(load(&[("TRANSFER_CHUNK_SIZE", "1024")]).is_err());
        assert!(load(&[("FTP_MAX_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("RESOLVER_TIMEOUT_SECS", "0")]).is_err());
        assert!(load(&[("S3_BUCKET", " ")]).is_err());
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let config = load(&[("BIOPORTAL_API_KEY", "secret")]).unwrap();
        let json = serde_json::to_string(&config.bioportal).unwrap();
        assert!(!json.contains("secret"));
    }
}
