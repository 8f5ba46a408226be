//! Upload job model and directory enumeration
//!
//! Jobs are built once, eagerly, from a synchronous walk of the packed
//! directory before any worker starts. The checksum is computed inline at
//! enumeration time and never re-read from disk afterward; a file that
//! changes mid-run keeps its stale recorded checksum, with no
//! re-validation.

use crate::checksum;
use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// Description of one file to transfer, plus its transfer-progress state.
///
/// Everything except `retries`, `uploaded_bytes` and `uploaded_chunks` is
/// fixed at creation. Exactly one worker owns a job at a time, so the
/// mutable counters need no synchronization.
#[derive(Debug, Clone)]
pub struct UploadJob {
    /// Absolute path to the source file
    pub local_path: PathBuf,
    /// Path relative to the upload root, `/`-separated, unique per run
    pub relative_path: String,
    /// Remote object key derived from the project id and relative path
    pub remote_key: String,
    /// File size recorded at enumeration time
    pub size_bytes: u64,
    /// Chunk granularity for checksums and multipart parts
    pub chunk_size_bytes: u64,
    /// Number of chunks the transfer will move (at least 1)
    pub chunk_count: u64,
    /// Content checksum recorded at enumeration time
    pub checksum: String,
    /// Retry counter, reset at the start of each chunk attempt sequence
    pub retries: u32,
    /// Bytes confirmed transferred, monotonically non-decreasing
    pub uploaded_bytes: u64,
    /// Chunks confirmed transferred, monotonically non-decreasing
    pub uploaded_chunks: u64,
}

impl UploadJob {
    /// Build a job for one regular file under `root`.
    pub fn from_file(
        root: &Path,
        path: &Path,
        project_id: &Uuid,
        chunk_size: u64,
    ) -> Result<Self> {
        let size_bytes = std::fs::metadata(path)?.len();
        let relative_path = relative_token(root, path)?;
        let remote_key = remote_key(project_id, &relative_path);
        let checksum = checksum::compute(path, chunk_size)?;

        Ok(Self {
            local_path: path.to_path_buf(),
            relative_path,
            remote_key,
            size_bytes,
            chunk_size_bytes: chunk_size,
            chunk_count: chunk_count(size_bytes, chunk_size),
            checksum,
            retries: 0,
            uploaded_bytes: 0,
            uploaded_chunks: 0,
        })
    }

    /// Length in bytes of the chunk at `chunk_index`; the last chunk may be
    /// shorter than the chunk size.
    pub fn chunk_len(&self, chunk_index: u64) -> u64 {
        let start = chunk_index.saturating_mul(self.chunk_size_bytes);
        self.size_bytes
            .saturating_sub(start)
            .min(self.chunk_size_bytes)
    }

    /// Record one confirmed chunk transfer.
    pub fn record_chunk(&mut self, bytes: u64) {
        self.uploaded_chunks += 1;
        self.uploaded_bytes += bytes;
    }

    /// Transfer progress as a percentage in 0-100.
    pub fn percent_done(&self) -> f64 {
        if self.size_bytes == 0 {
            if self.uploaded_chunks >= self.chunk_count {
                100.0
            } else {
                0.0
            }
        } else {
            (self.uploaded_bytes as f64 / self.size_bytes as f64) * 100.0
        }
    }
}

/// Number of chunks a file of `size` bytes occupies. Empty files still
/// occupy one (empty) chunk so they produce a remote object.
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    if size == 0 {
        1
    } else {
        size.div_ceil(chunk_size)
    }
}

/// Deterministic remote key for a file within a project.
pub fn remote_key(project_id: &Uuid, relative_path: &str) -> String {
    format!("projects/{}/{}", project_id, relative_path)
}

/// Walk the packed directory and build a job per regular file.
///
/// The walk is sorted so runs are deterministic, and checksums are computed
/// inline: this is the dominant up-front cost and happens before any worker
/// starts.
pub fn enumerate_jobs(root: &Path, project_id: &Uuid, chunk_size: u64) -> Result<Vec<UploadJob>> {
    let mut jobs = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        jobs.push(UploadJob::from_file(root, entry.path(), project_id, chunk_size)?);
    }

    Ok(jobs)
}

/// Relative path as a stable `/`-separated token.
fn relative_token(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        PipelineError::layout(format!(
            "{} is outside the upload root {}",
            path.display(),
            root.display()
        ))
    })?;

    Ok(relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}
