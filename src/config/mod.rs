//! Configuration module for Snap-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and resolving the access credential from the environment.
//!
//! # Example
//!
//! ```no_run
//! use snap_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Terms to process: {}", config.work.terms.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CaptureConfig, Config, FilterConfig, FilterKind, LoggingConfig, OutputConfig, RetryConfig,
    RunConfig, SourceConfig, UserAgentConfig, WorkConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, resolve_credential};
pub use validation::validate;
