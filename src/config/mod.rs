//! Configuration discovery and loading for cfgrc.
//!
//! This module handles:
//! - TOML config file and ignore file parsing
//! - Loading fragments and their `extends` chains
//! - Override block matching and ignore patterns
//! - Layer stacks and the directory cascade

pub mod cascade;
pub mod fragment;
pub mod ignore;
pub mod loader;
pub mod matcher;
pub mod parser;
pub mod source;
pub mod stack;
pub mod types;

pub use cascade::{CascadeOptions, CascadeResolver, Deprecation, normalize_path};
pub use fragment::{ConfigFragment, OverrideBlock};
pub use loader::FragmentLoader;
pub use parser::{parse_config_file, parse_config_str};
pub use source::{ConfigSource, FsConfigSource};
pub use stack::{ConfigLayerStack, StackBuilder};
pub use types::ConfigData;
