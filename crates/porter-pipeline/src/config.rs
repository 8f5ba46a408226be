//! Pipeline configuration
//!
//! Transfer tuning knobs with environment overrides. The chunk size is
//! correctness-critical, not just a tuning knob: the same value drives both
//! the local checksum calculator and the storage client's multipart part
//! size, so a remote multipart ETag and a locally computed checksum compare
//! byte-for-byte. `validate` fails fast if the value drops below the
//! provider's minimum part size rather than letting every dedup check
//! silently miss.

use crate::error::{PipelineError, Result};

// ============================================================================
// Transfer Constants
// ============================================================================

/// Default chunk size for checksums and multipart transfers.
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 8 * 1024 * 1024;

/// Smallest part size the storage provider accepts for multipart uploads.
pub const MIN_CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Default worker-pool width. The pipeline favors few highly parallel large
/// transfers over many small ones; the dominant cost is network throughput.
pub const DEFAULT_UPLOAD_WORKERS: usize = 2;

/// Default retry budget per chunk attempt sequence.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chunk granularity for checksums and multipart parts
    pub chunk_size_bytes: u64,

    /// Worker-pool width for concurrent file transfers
    pub upload_workers: usize,

    /// Retries allowed per chunk before the job fails terminally
    pub max_retries: u32,
}

impl PipelineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            upload_workers: DEFAULT_UPLOAD_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Load config from environment variables
    ///
    /// - `PORTER_CHUNK_SIZE_BYTES`: chunk granularity in bytes
    /// - `PORTER_UPLOAD_WORKERS`: worker-pool width
    /// - `PORTER_MAX_RETRIES`: per-chunk retry budget
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();

        if let Ok(chunk) = std::env::var("PORTER_CHUNK_SIZE_BYTES") {
            config.chunk_size_bytes = chunk.parse().map_err(|_| {
                PipelineError::config(format!("PORTER_CHUNK_SIZE_BYTES '{}' is not a byte count", chunk))
            })?;
        }

        if let Ok(workers) = std::env::var("PORTER_UPLOAD_WORKERS") {
            config.upload_workers = workers.parse().map_err(|_| {
                PipelineError::config(format!("PORTER_UPLOAD_WORKERS '{}' is not a count", workers))
            })?;
        }

        if let Ok(retries) = std::env::var("PORTER_MAX_RETRIES") {
            config.max_retries = retries.parse().map_err(|_| {
                PipelineError::config(format!("PORTER_MAX_RETRIES '{}' is not a count", retries))
            })?;
        }

        Ok(config)
    }

    /// Reject configurations that would produce checksums the remote store
    /// can never match, or a worker pool that cannot make progress.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes < MIN_CHUNK_SIZE_BYTES {
            return Err(PipelineError::config(format!(
                "chunk size {} is below the provider minimum part size {}",
                self.chunk_size_bytes, MIN_CHUNK_SIZE_BYTES
            )));
        }
        if self.upload_workers == 0 {
            return Err(PipelineError::config("upload worker count must be at least 1"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
