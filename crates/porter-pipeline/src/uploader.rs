//! Transfer orchestration
//!
//! Jobs run through a bounded worker pool. Each worker owns its job
//! outright; the only cross-worker coordination point is the cancellation
//! token, checked at the start of every chunk attempt. The first terminal
//! failure cancels the token, which stops new chunk and file attempts
//! while letting in-flight requests finish on their own.
//!
//! Retry policy: one explicit layer. Every chunk gets `max_retries`
//! retries (the counter resets at the start of each chunk's attempt
//! sequence); the storage client's own retries are disabled, so the bound
//! here is the whole story.

use crate::events::EventSink;
use crate::job::UploadJob;
use crate::storage::{ObjectStore, StorageError};
use futures::StreamExt;
use porter_common::Event;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happened to a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Transferred to the remote store
    Uploaded { bytes: u64 },
    /// Identical content already present remotely
    AlreadyPresent,
    /// Skipped or interrupted because the run was cancelled
    Cancelled,
    /// Terminal failure after the retry budget was spent
    Failed { message: String },
}

/// Aggregate result of one run.
#[derive(Debug)]
pub struct UploadSummary {
    /// False once any job failed terminally or cancellation was requested
    pub success: bool,
    pub files_uploaded: usize,
    pub files_deduplicated: usize,
    pub files_failed: usize,
    pub files_cancelled: usize,
    pub bytes_transferred: u64,
}

enum TransferError {
    Cancelled,
    Terminal { message: String },
}

/// Runs every enumerated job through the worker pool. Constructed once per
/// process invocation and run exactly once.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    sink: EventSink,
    cancel: CancellationToken,
    workers: usize,
    max_retries: u32,
}

impl Uploader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sink: EventSink,
        cancel: CancellationToken,
        workers: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            sink,
            cancel,
            workers: workers.max(1),
            max_retries,
        }
    }

    /// Transfer all jobs; returns once every worker has drained.
    pub async fn start(&self, jobs: Vec<UploadJob>) -> UploadSummary {
        let total = jobs.len();
        info!(files = total, workers = self.workers, "starting transfer");

        let outcomes: Vec<JobOutcome> = futures::stream::iter(jobs)
            .map(|job| self.process_job(job))
            .buffered(self.workers)
            .collect()
            .await;

        let mut summary = UploadSummary {
            success: true,
            files_uploaded: 0,
            files_deduplicated: 0,
            files_failed: 0,
            files_cancelled: 0,
            bytes_transferred: 0,
        };

        for outcome in &outcomes {
            match outcome {
                JobOutcome::Uploaded { bytes } => {
                    summary.files_uploaded += 1;
                    summary.bytes_transferred += bytes;
                }
                JobOutcome::AlreadyPresent => summary.files_deduplicated += 1,
                JobOutcome::Cancelled => summary.files_cancelled += 1,
                JobOutcome::Failed { .. } => summary.files_failed += 1,
            }
        }
        summary.success = !self.cancel.is_cancelled();

        info!(
            uploaded = summary.files_uploaded,
            deduplicated = summary.files_deduplicated,
            failed = summary.files_failed,
            cancelled = summary.files_cancelled,
            bytes = summary.bytes_transferred,
            "transfer finished"
        );

        summary
    }

    async fn process_job(&self, mut job: UploadJob) -> JobOutcome {
        if self.cancel.is_cancelled() {
            debug!(file = %job.relative_path, "run cancelled, skipping");
            return JobOutcome::Cancelled;
        }

        if self.already_uploaded(&job).await {
            info!(file = %job.relative_path, "identical content already present, skipping");
            return JobOutcome::AlreadyPresent;
        }

        match self.transfer(&mut job).await {
            Ok(()) => JobOutcome::Uploaded {
                bytes: job.uploaded_bytes,
            },
            Err(TransferError::Cancelled) => JobOutcome::Cancelled,
            Err(TransferError::Terminal { message }) => {
                warn!(file = %job.relative_path, error = %message, "transfer failed terminally");
                self.sink.emit(Event::UploadError {
                    relative_path: job.relative_path.clone(),
                    message: message.clone(),
                });
                self.cancel.cancel();
                JobOutcome::Failed { message }
            }
        }
    }

    /// Dedup check. Any fetch error degrades to "not present": dedup is an
    /// optimization, never a hard dependency.
    async fn already_uploaded(&self, job: &UploadJob) -> bool {
        match self.store.head_object(&job.remote_key).await {
            Ok(Some(remote)) => remote.checksum.as_deref() == Some(job.checksum.as_str()),
            Ok(None) => false,
            Err(err) => {
                warn!(
                    key = %job.remote_key,
                    error = %err,
                    "dedup check failed, uploading anyway"
                );
                false
            }
        }
    }

    async fn transfer(&self, job: &mut UploadJob) -> Result<(), TransferError> {
        if job.chunk_count <= 1 {
            self.transfer_single(job).await
        } else {
            self.transfer_multipart(job).await
        }
    }

    /// Whole-file transfer for jobs that fit in one chunk.
    async fn transfer_single(&self, job: &mut UploadJob) -> Result<(), TransferError> {
        job.retries = 0;
        loop {
            self.check_cancelled()?;

            match self.put_whole_file(job).await {
                Ok(()) => {
                    job.record_chunk(job.size_bytes);
                    self.emit_progress(job);
                    return Ok(());
                }
                Err(err) => self.spend_retry(job, err)?,
            }
        }
    }

    async fn put_whole_file(&self, job: &UploadJob) -> Result<(), StorageError> {
        let body = tokio::fs::read(&job.local_path).await?;
        self.store.put_object(&job.remote_key, body).await
    }

    /// Chunked transfer with per-chunk retries; every confirmed chunk
    /// yields one progress event.
    async fn transfer_multipart(&self, job: &mut UploadJob) -> Result<(), TransferError> {
        // Opening the multipart upload is chunk zero of the attempt
        // sequence: same budget, same cancellation checks.
        job.retries = 0;
        let upload_id = loop {
            self.check_cancelled()?;

            match self.store.create_multipart_upload(&job.remote_key).await {
                Ok(id) => break id,
                Err(err) => self.spend_retry(job, err)?,
            }
        };

        let mut parts: Vec<(i32, String)> = Vec::with_capacity(job.chunk_count as usize);

        for chunk_index in 0..job.chunk_count {
            let part_number = chunk_index as i32 + 1;
            job.retries = 0;

            let etag = loop {
                if let Err(cancelled) = self.check_cancelled() {
                    self.abort(job, &upload_id).await;
                    return Err(cancelled);
                }

                let attempt = self
                    .upload_one_part(job, &upload_id, chunk_index, part_number)
                    .await;
                match attempt {
                    Ok(etag) => break etag,
                    Err(err) => {
                        if let Err(terminal) = self.spend_retry(job, err) {
                            self.abort(job, &upload_id).await;
                            return Err(terminal);
                        }
                    }
                }
            };

            parts.push((part_number, etag));
            job.record_chunk(job.chunk_len(chunk_index));
            self.emit_progress(job);
        }

        job.retries = 0;
        loop {
            if let Err(cancelled) = self.check_cancelled() {
                self.abort(job, &upload_id).await;
                return Err(cancelled);
            }

            let attempt = self
                .store
                .complete_multipart_upload(&job.remote_key, &upload_id, parts.clone())
                .await;
            match attempt {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if let Err(terminal) = self.spend_retry(job, err) {
                        self.abort(job, &upload_id).await;
                        return Err(terminal);
                    }
                }
            }
        }
    }

    async fn upload_one_part(
        &self,
        job: &UploadJob,
        upload_id: &str,
        chunk_index: u64,
        part_number: i32,
    ) -> Result<String, StorageError> {
        let body = read_chunk(job, chunk_index).await?;
        self.store
            .upload_part(&job.remote_key, upload_id, part_number, body)
            .await
    }

    fn check_cancelled(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Count one failed attempt against the budget; terminal once retries
    /// exceed `max_retries`.
    fn spend_retry(&self, job: &mut UploadJob, err: StorageError) -> Result<(), TransferError> {
        job.retries += 1;
        if job.retries > self.max_retries {
            return Err(TransferError::Terminal {
                message: err.to_string(),
            });
        }
        warn!(
            file = %job.relative_path,
            attempt = job.retries,
            error = %err,
            "attempt failed, retrying"
        );
        Ok(())
    }

    /// Best-effort abandonment so the store can reclaim uploaded parts.
    async fn abort(&self, job: &UploadJob, upload_id: &str) {
        if let Err(err) = self
            .store
            .abort_multipart_upload(&job.remote_key, upload_id)
            .await
        {
            warn!(key = %job.remote_key, error = %err, "failed to abort multipart upload");
        }
    }

    fn emit_progress(&self, job: &UploadJob) {
        self.sink.emit(Event::UploadProgress {
            relative_path: job.relative_path.clone(),
            percent: job.percent_done(),
        });
    }
}

async fn read_chunk(job: &UploadJob, chunk_index: u64) -> Result<Vec<u8>, StorageError> {
    let mut file = tokio::fs::File::open(&job.local_path).await?;
    file.seek(SeekFrom::Start(chunk_index * job.chunk_size_bytes))
        .await?;

    let mut body = vec![0u8; job.chunk_len(chunk_index) as usize];
    file.read_exact(&mut body).await?;
    Ok(body)
}
