//! Command implementations for the CLI
//!
//! - config: Configuration display and validation
//! - ping: Send a sample trace through the full pipeline

pub mod config;
pub mod ping;
