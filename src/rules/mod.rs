//! Rule severities, definitions and option schemas.
//!
//! This module handles:
//! - Severity normalization and rule setting merges
//! - The registry of core rules and environments
//! - Compiling rule option schemas

pub mod registry;
pub mod schema;
pub mod severity;

pub use registry::{EnvironmentDefinition, Registry, RuleDefinition};
pub use schema::{BasicSchemaValidator, SchemaValidator};
pub use severity::{RuleSetting, Severity};
