//! Packing boundary
//!
//! The dependency-tracing packer that resolves a scene's referenced assets
//! and copies them into the target directory is an external collaborator.
//! The pipeline only defines the seam: a [`Packer`] emits `PACK_START` and
//! `PACK_PROGRESS` events through the sink while it works and returns a
//! report; the pipeline itself reports the missing assets and emits the
//! closing `PACK_END` (or `PACK_ERROR`) so every implementation gets
//! uniform termination reporting.

use crate::events::EventSink;
use async_trait::async_trait;
use porter_common::Event;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Packing phase failure; fatal to the whole run.
#[derive(Error, Debug)]
pub enum PackError {
    #[error("scene file not found: {0}")]
    SceneNotFound(String),

    #[error("packer failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a packer run produced.
#[derive(Debug, Default, Clone)]
pub struct PackReport {
    /// Referenced assets that could not be resolved; non-fatal.
    pub missing_files: Vec<String>,
}

/// Boundary to the external asset packer.
#[async_trait]
pub trait Packer: Send + Sync {
    /// Pack `scene_path` into `target_path`, reporting progress through
    /// `sink`. Implementations emit `PACK_START` and `PACK_PROGRESS`;
    /// unresolved assets go in the report, and the caller reports them and
    /// closes the phase with `PACK_END`.
    async fn pack(
        &self,
        scene_path: &Path,
        target_path: &Path,
        sink: &EventSink,
    ) -> Result<PackReport, PackError>;
}

/// Packer used when the project directory was already packed by an
/// external tool before the pipeline was spawned. Validates the scene file
/// and reports a single completed progress step.
pub struct PrepackedSource;

#[async_trait]
impl Packer for PrepackedSource {
    async fn pack(
        &self,
        scene_path: &Path,
        target_path: &Path,
        sink: &EventSink,
    ) -> Result<PackReport, PackError> {
        sink.emit(Event::PackStart {
            scene_path: scene_path.display().to_string(),
            target_path: target_path.display().to_string(),
        });

        if !scene_path.is_file() {
            return Err(PackError::SceneNotFound(scene_path.display().to_string()));
        }

        debug!(scene = %scene_path.display(), "project already packed, skipping resolution");
        sink.emit(Event::PackProgress { percent: 100.0 });

        Ok(PackReport::default())
    }
}
