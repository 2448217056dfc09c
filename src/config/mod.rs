//! Configuration module for urlscope
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use urlscope::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("urlscope.toml")).unwrap();
//! println!("Reading URLs from: {}", config.source.location);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArchiveConfig, Config, FeaturesConfig, IntelConfig, OutputConfig, PipelineConfig,
    ResolverConfig, SourceConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_config, INTEL_API_KEY_ENV,
};
