//! Object-storage configuration
//!
//! Endpoint and credentials arrive as process arguments from the
//! supervisor; only the region and addressing style have environment
//! defaults.

use std::env;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl StorageConfig {
    /// Build a config from invocation arguments, filling region and
    /// addressing style from the environment.
    ///
    /// - `PORTER_STORAGE_REGION`: region name (default "us-east-1")
    /// - `PORTER_STORAGE_PATH_STYLE`: path-style addressing (default true,
    ///   which is what self-hosted S3-compatible stores expect)
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: env::var("PORTER_STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: bucket.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            path_style: env::var("PORTER_STORAGE_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::new("http://localhost:9000", "ak", "sk", "projects");
        assert_eq!(config.endpoint, "http://localhost:9000");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.bucket, "projects");
        assert!(config.path_style);
    }
}
