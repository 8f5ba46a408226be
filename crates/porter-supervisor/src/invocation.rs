//! Pipeline invocation arguments
//!
//! The pipeline accepts exactly nine positional arguments, in this order:
//! scene path, target path, project name, control-plane URL, session
//! token, storage endpoint, storage access key, storage secret key,
//! bucket. [`PipelineInvocation::to_args`] is the single place that order
//! is encoded on the supervisor side.

use std::ffi::OsString;
use std::path::PathBuf;

/// Arguments for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineInvocation {
    /// Path to the scene file the project was packed from
    pub scene_path: PathBuf,
    /// Directory containing the packed project
    pub target_path: PathBuf,
    /// Project name to register with the control plane
    pub project_name: String,
    /// Base URL of the control-plane API
    pub api_url: String,
    /// Session token sent with every control-plane request
    pub session_token: String,
    /// Object-storage endpoint URL
    pub storage_endpoint: String,
    /// Object-storage access key
    pub storage_access_key: String,
    /// Object-storage secret key
    pub storage_secret_key: String,
    /// Bucket receiving the packed project
    pub bucket: String,
}

impl PipelineInvocation {
    /// Positional argument vector in the order the pipeline expects.
    pub fn to_args(&self) -> Vec<OsString> {
        vec![
            self.scene_path.clone().into_os_string(),
            self.target_path.clone().into_os_string(),
            OsString::from(&self.project_name),
            OsString::from(&self.api_url),
            OsString::from(&self.session_token),
            OsString::from(&self.storage_endpoint),
            OsString::from(&self.storage_access_key),
            OsString::from(&self.storage_secret_key),
            OsString::from(&self.bucket),
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_order() {
        let invocation = PipelineInvocation {
            scene_path: PathBuf::from("/work/shot.blend"),
            target_path: PathBuf::from("/work/packed"),
            project_name: "demo".to_string(),
            api_url: "https://api.example.com".to_string(),
            session_token: "token".to_string(),
            storage_endpoint: "http://storage:9000".to_string(),
            storage_access_key: "access".to_string(),
            storage_secret_key: "secret".to_string(),
            bucket: "projects".to_string(),
        };

        let args: Vec<String> = invocation
            .to_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "/work/shot.blend",
                "/work/packed",
                "demo",
                "https://api.example.com",
                "token",
                "http://storage:9000",
                "access",
                "secret",
                "projects",
            ]
        );
    }
}
