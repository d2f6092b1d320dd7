use serde::{Deserialize, Serialize};

pub const DEFAULT_S3_REGION: &str = "us-east-1";
pub const DEFAULT_S3_BUCKET: &str = "bronze-layer";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static credentials. When absent the default AWS provider chain is used.
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl StorageConfig {
    /// Read `S3_*` variables through `lookup`, falling back to the `AWS_*`
    /// credential names.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            endpoint: lookup("S3_ENDPOINT").filter(|v| !v.is_empty()),
            region: lookup("S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            bucket: lookup("S3_BUCKET").unwrap_or_else(|| DEFAULT_S3_BUCKET.to_string()),
            access_key: lookup("S3_ACCESS_KEY").or_else(|| lookup("AWS_ACCESS_KEY_ID")),
            secret_key: lookup("S3_SECRET_KEY").or_else(|| lookup("AWS_SECRET_ACCESS_KEY")),
            path_style: lookup("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_S3_REGION.to_string(),
            bucket: bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }

    /// Both halves of a static key pair, if configured.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("http://localhost:9000", "test-bucket");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.bucket, "test-bucket");
        assert!(config.path_style);
        assert_eq!(config.static_credentials(), Some(("minioadmin", "minioadmin")));
    }

    #[test]
    fn test_from_lookup_falls_back_to_aws_names() {
        let vars: HashMap<&str, &str> = [
            ("AWS_ACCESS_KEY_ID", "ak"),
            ("AWS_SECRET_ACCESS_KEY", "sk"),
            ("S3_PATH_STYLE", "true"),
        ]
        .into_iter()
        .collect();

        let config = StorageConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.endpoint, None);
        assert_eq!(config.region, DEFAULT_S3_REGION);
        assert_eq!(config.bucket, DEFAULT_S3_BUCKET);
        assert_eq!(config.static_credentials(), Some(("ak", "sk")));
        assert!(config.path_style);
    }

    #[test]
    fn test_partial_credentials_use_provider_chain() {
        let config = StorageConfig::from_lookup(|k| (k == "S3_ACCESS_KEY").then(|| "ak".into()));
        assert_eq!(config.static_credentials(), None);
    }
}
