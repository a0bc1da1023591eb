//! Configuration module for Site-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Every key has a default, so the crawler also runs with no file at
//! all; command-line flags are applied on top by the binary.
//!
//! # Example
//!
//! ```no_run
//! use site_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Pages go to: {}", config.output.output_dir.display());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ClassifierConfig, Config, CrawlerConfig, OutputConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
