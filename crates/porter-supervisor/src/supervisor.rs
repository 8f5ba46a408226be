//! Spawning and reading the pipeline child process

use crate::handle::{PipelineHandle, PipelineMessage};
use crate::invocation::PipelineInvocation;
use porter_common::Event;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, SyncSender};
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

/// Default bound on the message channel. The reader thread blocks once the
/// host falls this far behind, which in turn backpressures the child
/// through the stdout pipe.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Failure to start or wire up the pipeline child process.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("failed to spawn pipeline: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("pipeline child has no captured stdout")]
    NoStdout,

    #[error("failed to start reader thread: {0}")]
    Reader(#[source] std::io::Error),
}

/// Spawns pipeline runs from a configured binary path.
pub struct Supervisor {
    binary: PathBuf,
    channel_capacity: usize,
}

impl Supervisor {
    /// Supervise runs of the pipeline binary at `binary`.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Override the message channel bound.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Start one pipeline run. Only one run per project should be live at
    /// a time; concurrent runs against the same remote keys are not safe.
    pub fn spawn(&self, invocation: &PipelineInvocation) -> Result<PipelineHandle, SupervisorError> {
        debug!(binary = %self.binary.display(), "spawning pipeline");

        let child = Command::new(&self.binary)
            .args(invocation.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(SupervisorError::Spawn)?;

        attach(child, self.channel_capacity)
    }
}

/// Wire an already spawned child (stdout must be piped) to a reader thread
/// and message channel.
pub fn attach(mut child: Child, capacity: usize) -> Result<PipelineHandle, SupervisorError> {
    let stdout = child.stdout.take().ok_or(SupervisorError::NoStdout)?;
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));

    let reader = thread::Builder::new()
        .name("porter-supervisor-reader".to_string())
        .spawn(move || read_loop(stdout, tx))
        .map_err(SupervisorError::Reader)?;

    Ok(PipelineHandle::new(child, rx, reader))
}

/// Parse lines until end-of-stream. An unrecognized protocol line is
/// logged and dropped, never fatal; anything without the protocol prefix
/// passes through as a diagnostic.
fn read_loop(stdout: ChildStdout, tx: SyncSender<PipelineMessage>) {
    let reader = BufReader::new(stdout);

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "pipeline stdout read failed");
                break;
            }
        };

        let message = match Event::parse(&line) {
            Ok(Some(event)) => PipelineMessage::Event(event),
            Ok(None) => PipelineMessage::Diagnostic(line),
            Err(err) => {
                warn!(error = %err, line = %line, "ignoring unrecognized protocol line");
                continue;
            }
        };

        if tx.send(message).is_err() {
            // Receiver gone: the host dropped the handle.
            break;
        }
    }
}
