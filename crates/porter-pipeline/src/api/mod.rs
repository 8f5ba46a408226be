//! Control-plane client module
//!
//! HTTP client for the service that tracks project records, distinct from
//! the object-storage data plane that holds file bytes.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::{ApiClient, ApiError};
pub use types::*;
