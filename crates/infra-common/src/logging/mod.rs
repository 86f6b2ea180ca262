//! Logging setup and structured log context.

pub mod context;
pub mod setup;

pub use context::LogContext;
pub use setup::{LoggingConfig, parse_log_level, setup_logging};
