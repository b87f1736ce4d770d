//! cfgrc - cascading configuration resolution for static-analysis tools.
//!
//! This library resolves the one effective configuration that applies to a
//! source file, including:
//! - Config discovery up the directory tree with `root` and home boundaries
//! - `extends` chains, shared configs and plugin presets
//! - Per-file override blocks matched by glob patterns
//! - Validation of severities, rule options, environments and globals
//!
//! # Example
//!
//! ```no_run
//! use cfgrc::config::{CascadeOptions, CascadeResolver};
//! use std::path::Path;
//!
//! let mut resolver = CascadeResolver::with_defaults(CascadeOptions::default()).unwrap();
//! let config = resolver.config_for_file(Path::new("src/main.js")).unwrap();
//!
//! for (rule, setting) in &config.rules {
//!     println!("{rule}: {}", setting.severity);
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod plugins;
pub mod rules;

pub use error::{CfgrcError, Result};
