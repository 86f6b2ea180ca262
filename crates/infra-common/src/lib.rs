//! Shared infrastructure for the webcall workspace.
//!
//! This crate carries the ambient concerns the other crates lean on:
//!
//! - **Logging** - `tracing` subscriber setup with a small config struct
//! - **Error context** - helpers for attaching component/operation context
//!   to errors as they cross crate boundaries

pub mod errors;
pub mod logging;

pub use errors::{Error, ErrorExt, Result};
pub use logging::{LoggingConfig, parse_log_level, setup_logging};
