//! Porter Pipeline Library
//!
//! The upload pipeline runs as an isolated child process: it validates a
//! packed project directory, registers the upload with the control plane,
//! transfers every file to object storage through a bounded worker pool,
//! and reports each state transition to the supervising process as a typed
//! lifecycle event.
//!
//! # Overview
//!
//! - **Packing boundary**: hand-off point to the external asset packer
//!   (`pack`)
//! - **Job Model**: per-file transfer descriptions with content checksums
//!   (`job`, `checksum`)
//! - **Control Plane**: project registration and finalization (`api`)
//! - **Object Storage**: S3-compatible transfer client (`storage`)
//! - **Orchestration**: dedup, chunked transfer, bounded retries,
//!   cancellation (`uploader`, `pipeline`)
//! - **Reporting**: typed event channel drained onto stdout (`events`)

pub mod api;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod pack;
pub mod pipeline;
pub mod storage;
pub mod uploader;

// Re-export commonly used types
pub use cli::Invocation;
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
