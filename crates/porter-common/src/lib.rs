//! Porter Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and utilities for the Porter workspace.
//!
//! # Overview
//!
//! This crate provides the pieces both sides of the process boundary agree
//! on:
//!
//! - **Event Protocol**: the typed lifecycle events the pipeline reports
//!   and the line codec used to carry them over the child's stdout
//! - **Logging**: centralized `tracing` initialization; diagnostics go to
//!   stderr so stdout stays reserved for protocol lines

pub mod event;
pub mod logging;

// Re-export commonly used types
pub use event::{Event, ParseError};
