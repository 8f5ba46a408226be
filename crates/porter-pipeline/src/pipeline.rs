//! End-to-end run sequence
//!
//! Pack, validate, register, transfer, finalize. Every fatal condition is
//! translated into an explanatory event line before the process exits, so
//! the supervisor never has to interpret a bare nonzero exit code; the
//! only exception is a genuinely unexpected crash, which the supervisor
//! infers from process death.

use crate::api::ApiClient;
use crate::cli::Invocation;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::events::EventSink;
use crate::job;
use crate::pack::{Packer, PrepackedSource};
use crate::storage::{ObjectStore, S3Store, StorageConfig};
use crate::uploader::Uploader;
use porter_common::Event;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One pipeline invocation. Constructed once per process, runs exactly
/// once; no state persists between runs.
pub struct Pipeline {
    invocation: Invocation,
    config: PipelineConfig,
    api: ApiClient,
    store: Arc<dyn ObjectStore>,
    packer: Box<dyn Packer>,
    sink: EventSink,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Assemble a pipeline from explicit parts. Collaborators are injected
    /// here; use [`Pipeline::from_invocation`] for the production wiring.
    pub fn new(
        invocation: Invocation,
        config: PipelineConfig,
        api: ApiClient,
        store: Arc<dyn ObjectStore>,
        packer: Box<dyn Packer>,
        sink: EventSink,
    ) -> Self {
        Self {
            invocation,
            config,
            api,
            store,
            packer,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    /// Production wiring: control-plane client and S3 store built from the
    /// invocation arguments, prepacked-source packer, config validated
    /// before anything runs.
    pub fn from_invocation(
        invocation: Invocation,
        config: PipelineConfig,
        sink: EventSink,
    ) -> Result<Self> {
        config.validate()?;

        let api = ApiClient::new(
            invocation.api_url.clone(),
            invocation.session_token.clone(),
        )?;
        let store = Arc::new(S3Store::new(StorageConfig::new(
            invocation.storage_endpoint.clone(),
            invocation.storage_access_key.clone(),
            invocation.storage_secret_key.clone(),
            invocation.bucket.clone(),
        )));

        Ok(Self::new(
            invocation,
            config,
            api,
            store,
            Box::new(PrepackedSource),
            sink,
        ))
    }

    /// Token an embedding host can use to stop new transfer work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the whole sequence; the returned exit code is also carried by
    /// the final `END` event.
    pub async fn run(self) -> i32 {
        let success = self.execute().await;
        let exit_code = if success { 0 } else { 1 };
        self.sink.emit(Event::End { exit_code });
        exit_code
    }

    async fn execute(&self) -> bool {
        let scene = self.invocation.scene_path.display().to_string();
        let target = self.invocation.target_path.display().to_string();

        // Packing phase. The packer emits PACK_START and progress; the
        // closing PACK_END comes from here so every packer reports alike.
        match self
            .packer
            .pack(
                &self.invocation.scene_path,
                &self.invocation.target_path,
                &self.sink,
            )
            .await
        {
            Ok(report) => {
                // Missing assets are reported upward but never fatal.
                for missing in &report.missing_files {
                    warn!(file = %missing, "referenced asset missing");
                    self.sink.emit(Event::MissingFile {
                        scene_path: scene.clone(),
                        target_path: target.clone(),
                        file: missing.clone(),
                    });
                }
                self.sink.emit(Event::PackEnd {
                    scene_path: scene.clone(),
                    target_path: target.clone(),
                    success: true,
                });
            }
            Err(err) => {
                error!(error = %err, "packing failed");
                self.sink.emit(Event::PackError {
                    scene_path: scene.clone(),
                    target_path: target.clone(),
                    message: err.to_string(),
                });
                self.sink.emit(Event::PackEnd {
                    scene_path: scene,
                    target_path: target,
                    success: false,
                });
                return false;
            }
        }

        // The packed directory must exist before the control plane hears
        // about the project; a missing one is fatal before any job runs.
        if !self.invocation.target_path.is_dir() {
            error!(target = %target, "target directory not found");
            self.sink.emit(Event::ProjectCreationError {
                project_name: self.invocation.project_name.clone(),
                message: format!("target directory not found: {}", target),
            });
            return false;
        }

        let record = match self
            .api
            .prepare_upload(
                &self.invocation.project_name,
                &self.invocation.entry_filename(),
            )
            .await
        {
            Ok(record) => record,
            Err(err) => {
                error!(error = %err, "project creation failed");
                self.sink.emit(Event::ProjectCreationError {
                    project_name: self.invocation.project_name.clone(),
                    message: err.to_string(),
                });
                return false;
            }
        };
        info!(project_id = %record.id, "project registered");

        self.sink.emit(Event::UploadStart {
            target_path: target.clone(),
        });

        // Eager enumeration with inline checksums: the dominant up-front
        // cost, finished before any worker starts.
        let jobs = match job::enumerate_jobs(
            &self.invocation.target_path,
            &record.id,
            self.config.chunk_size_bytes,
        ) {
            Ok(jobs) => jobs,
            Err(err) => {
                error!(error = %err, "enumeration failed");
                self.sink.emit(Event::Error {
                    message: err.to_string(),
                });
                self.sink.emit(Event::UploadEnd {
                    target_path: target,
                    success: false,
                });
                return false;
            }
        };
        info!(files = jobs.len(), "enumerated upload jobs");

        let uploader = Uploader::new(
            self.store.clone(),
            self.sink.clone(),
            self.cancel.clone(),
            self.config.upload_workers,
            self.config.max_retries,
        );
        let summary = uploader.start(jobs).await;

        // Finish is called even when the transfer failed so the server can
        // account for the attempt; its own failure on an already failed run
        // is logged, not double-reported.
        let finish_ok = match self.api.finish_upload(&record.id).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "finalization failed");
                if summary.success {
                    self.sink.emit(Event::Error {
                        message: err.to_string(),
                    });
                }
                false
            }
        };

        let success = summary.success && finish_ok;
        self.sink.emit(Event::UploadEnd {
            target_path: target,
            success,
        });
        success
    }
}
