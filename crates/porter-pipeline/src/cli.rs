//! Process invocation
//!
//! The pipeline is spawned by a supervisor with positional arguments only;
//! there is nothing interactive about it. A wrong-arity invocation prints
//! usage and exits 1 without emitting a single protocol line.

use clap::Parser;
use std::path::PathBuf;

/// Porter upload pipeline - transfers a packed project directory to object storage
#[derive(Parser, Debug, Clone)]
#[command(name = "porter-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Invocation {
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

impl Invocation {
    /// File name of the scene file, used as the project's entry file when
    /// registering with the control plane.
    pub fn entry_filename(&self) -> String {
        self.scene_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.scene_path.display().to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn full_args() -> Vec<&'static str> {
        vec![
            "porter-pipeline",
            "/work/shot.blend",
            "/work/packed",
            "demo-project",
            "https://api.example.com",
            "session-token",
            "http://storage.example.com:9000",
            "access-key",
            "secret-key",
            "projects-bucket",
        ]
    }

    #[test]
    fn test_parses_all_positional_arguments() {
        let invocation = Invocation::try_parse_from(full_args()).unwrap();
        assert_eq!(invocation.scene_path, PathBuf::from("/work/shot.blend"));
        assert_eq!(invocation.target_path, PathBuf::from("/work/packed"));
        assert_eq!(invocation.project_name, "demo-project");
        assert_eq!(invocation.api_url, "https://api.example.com");
        assert_eq!(invocation.session_token, "session-token");
        assert_eq!(invocation.storage_endpoint, "http://storage.example.com:9000");
        assert_eq!(invocation.storage_access_key, "access-key");
        assert_eq!(invocation.storage_secret_key, "secret-key");
        assert_eq!(invocation.bucket, "projects-bucket");
    }

    #[test]
    fn test_missing_argument_is_rejected() {
        let mut args = full_args();
        args.pop();
        assert!(Invocation::try_parse_from(args).is_err());
    }

    #[test]
    fn test_extra_argument_is_rejected() {
        let mut args = full_args();
        args.push("surplus");
        assert!(Invocation::try_parse_from(args).is_err());
    }

    #[test]
    fn test_entry_filename() {
        let invocation = Invocation::try_parse_from(full_args()).unwrap();
        assert_eq!(invocation.entry_filename(), "shot.blend");
    }
}
