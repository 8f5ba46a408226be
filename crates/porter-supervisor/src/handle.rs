//! Handle to a running pipeline
//!
//! Messages flow reader thread -> bounded channel -> host loop. Every
//! receive path goes through the handle so it can observe `UPLOAD_END`
//! and `END` on the way past; that is what lets [`PipelineHandle::wait`]
//! infer a failed run when the child dies without reporting one.

use porter_common::Event;
use std::io;
use std::process::Child;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

/// One decoded line of pipeline output.
#[derive(Debug)]
pub enum PipelineMessage {
    /// A protocol line
    Event(Event),
    /// Ordinary diagnostic text, passed through untouched
    Diagnostic(String),
}

/// Final result of a pipeline run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The child's exit code; `None` when it was killed by a signal
    pub exit_code: Option<i32>,
    /// True only when the pipeline reported a successful transfer AND
    /// exited cleanly. Death without an `UPLOAD_END` counts as failure.
    pub success: bool,
    /// Whether the final `END` line arrived; false means the output was
    /// truncated, e.g. on a crash or cancellation
    pub saw_end: bool,
    /// Messages that were still buffered when the stream ended
    pub unconsumed: Vec<PipelineMessage>,
}

/// A running pipeline child process plus its message channel.
pub struct PipelineHandle {
    child: Child,
    receiver: Receiver<PipelineMessage>,
    reader: Option<JoinHandle<()>>,
    upload_success: Option<bool>,
    saw_end: bool,
}

impl PipelineHandle {
    pub(crate) fn new(
        child: Child,
        receiver: Receiver<PipelineMessage>,
        reader: JoinHandle<()>,
    ) -> Self {
        Self {
            child,
            receiver,
            reader: Some(reader),
            upload_success: None,
            saw_end: false,
        }
    }

    /// Block until the next message; `None` once the stream has ended.
    pub fn recv(&mut self) -> Option<PipelineMessage> {
        match self.receiver.recv() {
            Ok(message) => {
                self.observe(&message);
                Some(message)
            }
            Err(_) => None,
        }
    }

    /// Wait up to `timeout` for the next message. Hosts polling from their
    /// own scheduling loop use this to stay responsive.
    pub fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<PipelineMessage, RecvTimeoutError> {
        let message = self.receiver.recv_timeout(timeout)?;
        self.observe(&message);
        Ok(message)
    }

    /// Non-blocking receive; `None` when nothing is buffered right now.
    pub fn try_recv(&mut self) -> Option<PipelineMessage> {
        match self.receiver.try_recv() {
            Ok(message) => {
                self.observe(&message);
                Some(message)
            }
            Err(_) => None,
        }
    }

    /// Terminate the child. Buffered lines stay readable: call
    /// [`PipelineHandle::wait`] afterwards to drain them and collect the
    /// outcome.
    pub fn cancel(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            // Already exited on its own.
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Drain remaining messages, then wait for the child. End-of-stream
    /// plus the exit status is the authoritative termination signal; the
    /// `END` line alone is not trusted since output may be truncated.
    pub fn wait(mut self) -> io::Result<RunOutcome> {
        let mut unconsumed = Vec::new();
        while let Ok(message) = self.receiver.recv() {
            self.observe(&message);
            unconsumed.push(message);
        }

        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        let status = self.child.wait()?;
        let exit_code = status.code();
        let success = self.upload_success == Some(true) && exit_code == Some(0);

        Ok(RunOutcome {
            exit_code,
            success,
            saw_end: self.saw_end,
            unconsumed,
        })
    }

    fn observe(&mut self, message: &PipelineMessage) {
        if let PipelineMessage::Event(event) = message {
            match event {
                Event::UploadEnd { success, .. } => self.upload_success = Some(*success),
                Event::End { .. } => self.saw_end = true,
                _ => {}
            }
        }
    }
}
