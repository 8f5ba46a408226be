//! Typed event channel
//!
//! Components report lifecycle transitions by emitting [`Event`] values
//! into an [`EventSink`]; the binary drains the paired receiver onto
//! stdout, one protocol line per event, flushed immediately. A single
//! consumer writing in channel order is what guarantees the documented
//! event ordering; nothing else writes to stdout.
//!
//! Tests subscribe to the receiver directly and assert on typed events
//! instead of scraping text.

use porter_common::Event;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// Sending half of the event channel. Cheap to clone; one per run.
#[derive(Clone)]
pub struct EventSink {
    tx: UnboundedSender<Event>,
}

impl EventSink {
    /// Create a connected sink/receiver pair.
    pub fn channel() -> (EventSink, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit one event. A closed receiver means the process is already
    /// shutting down, so the event is dropped silently.
    pub fn emit(&self, event: Event) {
        trace!(line = %event, "emit");
        let _ = self.tx.send(event);
    }
}

/// Drain the receiver onto stdout until every sink clone is dropped.
///
/// Each line is flushed on write so the supervisor sees events as they
/// happen, not when the stdio buffer fills.
pub async fn forward_to_stdout(mut rx: UnboundedReceiver<Event>) {
    let mut stdout = tokio::io::stdout();

    while let Some(event) = rx.recv().await {
        let mut line = event.to_line();
        line.push('\n');
        if stdout.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}
