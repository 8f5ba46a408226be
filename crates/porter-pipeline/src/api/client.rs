//! HTTP client for the control plane
//!
//! The control plane tracks project records; the pipeline talks to it
//! exactly twice per run: once to register the upload and obtain a project
//! id, once to mark the project ready. Non-2xx responses surface as
//! [`ApiError::Status`] with the response body preserved, so the caller
//! can report the server's own words upward.

use crate::api::{endpoints, types::*};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// API Client Constants
// ============================================================================

/// Default timeout for control-plane requests in seconds.
/// Can be overridden via PORTER_API_TIMEOUT_SECS environment variable.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

/// Control-plane communication failure
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-2xx status; the body is preserved
    #[error("control plane returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The server answered 2xx but flagged the request as unsuccessful
    #[error("control plane rejected the request: {0}")]
    Rejected(String),

    /// The request never completed
    #[error("control-plane request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client for the control-plane API
pub struct ApiClient {
    client: Client,
    base_url: String,
    session_token: String,
}

impl ApiClient {
    /// Create a new client carrying the session token of the invoking user.
    pub fn new(base_url: String, session_token: String) -> Result<Self, ApiError> {
        let timeout_secs = std::env::var("PORTER_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_API_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            session_token,
        })
    }

    /// Register an upload; the returned record carries the project id every
    /// remote key is derived from.
    pub async fn prepare_upload(
        &self,
        project_name: &str,
        entry_filename: &str,
    ) -> Result<ProjectRecord, ApiError> {
        let url = endpoints::prepare_upload_url(&self.base_url);
        let request = PrepareUploadRequest {
            project_name: project_name.to_string(),
            entry_filename: entry_filename.to_string(),
        };

        debug!(project = project_name, "registering upload with control plane");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::COOKIE, self.session_cookie())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let api_response: ApiResponse<ProjectRecord> = response.json().await?;
        if !api_response.success {
            return Err(ApiError::Rejected(api_response.error.unwrap_or_else(|| {
                format!("project '{}' was not accepted", project_name)
            })));
        }

        Ok(api_response.data)
    }

    /// Mark the project ready once every file is in place.
    pub async fn finish_upload(&self, project_id: &Uuid) -> Result<(), ApiError> {
        let url = endpoints::finish_upload_url(&self.base_url, project_id);

        debug!(project_id = %project_id, "finalizing upload with control plane");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::COOKIE, self.session_cookie())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session_cookie(&self) -> String {
        format!("session={}", self.session_token)
    }
}
