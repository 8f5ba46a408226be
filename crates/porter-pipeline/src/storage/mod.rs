//! Object-storage client
//!
//! The uploader talks to storage through the [`ObjectStore`] trait; the
//! production implementation is [`S3Store`]. The trait stays primitive
//! (head, put, multipart lifecycle) so chunking and retry policy live in
//! one place, the uploader.
//!
//! The SDK's internal retries are disabled: the uploader's per-chunk retry
//! loop is the single retry layer, with one documented bound.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{retry::RetryConfig, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use thiserror::Error;
use tracing::debug;

pub mod config;

pub use config::StorageConfig;

/// Object-storage request failure
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage request failed for '{key}': {message}")]
    Request { key: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    fn request(key: &str, message: impl std::fmt::Display) -> Self {
        Self::Request {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Metadata of an object already present in the store.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    /// Content checksum as reported by the store, quotes stripped, directly
    /// comparable to a locally computed checksum
    pub checksum: Option<String>,
    pub size_bytes: u64,
}

/// Minimal storage surface the uploader depends on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch metadata for `key`; `None` if the object does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StorageError>;

    /// Store a whole object in one request.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    /// Begin a multipart upload; returns the upload id.
    async fn create_multipart_upload(&self, key: &str) -> Result<String, StorageError>;

    /// Upload one part; returns the part's checksum tag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String, StorageError>;

    /// Complete a multipart upload from `(part_number, checksum_tag)` pairs.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<(), StorageError>;

    /// Abandon a multipart upload so the store can reclaim the parts.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str)
        -> Result<(), StorageError>;
}

/// S3-compatible implementation of [`ObjectStore`].
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(config: StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "porter-storage",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .force_path_style(config.path_style)
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(RemoteObject {
                checksum: output.e_tag().map(normalize_etag),
                size_bytes: output.content_length().unwrap_or(0) as u64,
            })),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|service| service.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(None)
                } else {
                    Err(StorageError::request(key, DisplayErrorContext(&err)))
                }
            }
        }
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        debug!(key, bytes = body.len(), "put object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StorageError::request(key, DisplayErrorContext(&err)))?;

        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StorageError::request(key, DisplayErrorContext(&err)))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::request(key, "multipart create returned no upload id"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String, StorageError> {
        debug!(key, part_number, bytes = body.len(), "upload part");

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StorageError::request(key, DisplayErrorContext(&err)))?;

        Ok(output.e_tag().map(normalize_etag).unwrap_or_default())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<(), StorageError> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .into_iter()
                    .map(|(part_number, etag)| {
                        CompletedPart::builder()
                            .part_number(part_number)
                            .e_tag(etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|err| StorageError::request(key, DisplayErrorContext(&err)))?;

        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| StorageError::request(key, DisplayErrorContext(&err)))?;

        Ok(())
    }
}

/// The store reports checksums wrapped in quotes; strip them so the value
/// compares verbatim with a locally computed one.
fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}
