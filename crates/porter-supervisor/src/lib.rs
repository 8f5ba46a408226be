//! Porter Supervisor Library
//!
//! Host-side wrapper around the pipeline child process. The pipeline is
//! spawned with positional arguments and reports through tagged lines on
//! its stdout; this crate turns that boundary into typed values:
//!
//! - **Spawning**: build the argument vector and start the child
//!   (`invocation`, [`Supervisor`])
//! - **Reading**: a dedicated reader thread parses each line and pushes
//!   [`PipelineMessage`] values into a bounded channel, so a slow or
//!   stalled transfer never blocks the host's own scheduling loop
//!   (`handle`)
//! - **Termination**: end-of-stream plus the child's exit status is the
//!   authoritative signal, not the final protocol line; output may be
//!   truncated on a crash, in which case the run is inferred failed
//!
//! The crate is deliberately synchronous (std thread + std channel) so it
//! embeds in any host loop without dragging in a runtime.

pub mod handle;
pub mod invocation;
pub mod supervisor;

// Re-export commonly used types
pub use handle::{PipelineHandle, PipelineMessage, RunOutcome};
pub use invocation::PipelineInvocation;
pub use supervisor::{attach, Supervisor, SupervisorError, DEFAULT_CHANNEL_CAPACITY};
