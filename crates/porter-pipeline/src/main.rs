//! Porter pipeline - child-process entry point

use clap::Parser;
use porter_common::logging::{init_logging, LogConfig};
use porter_common::Event;
use porter_pipeline::config::PipelineConfig;
use porter_pipeline::events::{self, EventSink};
use porter_pipeline::{Invocation, Pipeline};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Diagnostics go to stderr; stdout carries only protocol lines.
    let log_config = LogConfig::from_env().unwrap_or_default();
    let _ = init_logging(&log_config);

    // A malformed invocation prints usage and exits 1 without emitting a
    // single protocol line.
    let invocation = match Invocation::try_parse() {
        Ok(invocation) => invocation,
        Err(err) => {
            let _ = err.print();
            process::exit(1);
        }
    };

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };

    let (sink, rx) = EventSink::channel();
    let writer = tokio::spawn(events::forward_to_stdout(rx));

    let pipeline = match Pipeline::from_invocation(invocation, config, sink.clone()) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!(error = %err, "failed to assemble pipeline");
            sink.emit(Event::Error {
                message: err.to_string(),
            });
            sink.emit(Event::End { exit_code: 1 });
            drop(sink);
            let _ = writer.await;
            process::exit(1);
        }
    };
    drop(sink);

    let exit_code = pipeline.run().await;

    // The writer finishes once every sink clone is gone; waiting for it
    // guarantees the END line is flushed before the process dies.
    let _ = writer.await;
    process::exit(exit_code);
}
