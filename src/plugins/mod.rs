//! Plugin, parser and processor references.
//!
//! This module handles:
//! - Definitions a plugin contributes (rules, environments, processors, presets)
//! - Deferred-error dependency wrappers stored in loaded fragments
//! - The module resolver seam and the in-memory plugin pool

pub mod pool;

pub use pool::{ModuleResolver, PluginPool};

use crate::config::types::ConfigData;
use crate::error::{CfgrcError, ModuleKind, Result};
use crate::rules::registry::{EnvironmentDefinition, RuleDefinition};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

const PLUGIN_PREFIX: &str = "cfgrc-plugin";

/// Everything a plugin contributes, keyed by unqualified name.
#[derive(Debug, Clone, Default)]
pub struct PluginDefinition {
	pub rules: BTreeMap<String, Arc<RuleDefinition>>,
	pub environments: BTreeMap<String, Arc<EnvironmentDefinition>>,
	pub processors: BTreeMap<String, Arc<ProcessorDefinition>>,
	/// Presets usable as `extends = "plugin:<id>/<name>"`.
	pub configs: BTreeMap<String, ConfigData>,
}

/// A resolved parser module.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserDefinition {
	pub name: String,
	pub location: Option<PathBuf>,
}

/// A file processor provided by a plugin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorDefinition;

/// A resolved module reference, or the failure captured while resolving it.
///
/// Failures are raised when the definition is first asked for, so unrelated
/// settings in the same fragment stay usable.
#[derive(Debug, Clone)]
pub enum Dependency<T> {
	Resolved {
		id: String,
		importer: String,
		definition: Arc<T>,
	},
	Failed {
		kind: ModuleKind,
		id: String,
		importer: String,
		error: Arc<CfgrcError>,
	},
}

impl<T> Dependency<T> {
	/// Wrap a resolution result.
	pub fn capture(kind: ModuleKind, id: &str, importer: &str, result: Result<Arc<T>>) -> Self {
		match result {
			Ok(definition) => Dependency::Resolved {
				id: id.to_string(),
				importer: importer.to_string(),
				definition,
			},
			Err(error) => Dependency::Failed {
				kind,
				id: id.to_string(),
				importer: importer.to_string(),
				error: Arc::new(error),
			},
		}
	}

	/// The declared identifier.
	pub fn id(&self) -> &str {
		match self {
			Dependency::Resolved { id, .. } | Dependency::Failed { id, .. } => id,
		}
	}

	/// Name of the fragment that declared this dependency.
	pub fn importer(&self) -> &str {
		match self {
			Dependency::Resolved { importer, .. } | Dependency::Failed { importer, .. } => importer,
		}
	}

	/// Dereference, raising the captured failure if resolution failed.
	pub fn definition(&self) -> Result<&Arc<T>> {
		match self {
			Dependency::Resolved { definition, .. } => Ok(definition),
			Dependency::Failed {
				kind,
				id,
				importer,
				error,
			} => Err(CfgrcError::DependencyResolution {
				kind: *kind,
				id: id.clone(),
				importer: importer.clone(),
				source: Arc::clone(error),
			}),
		}
	}

	pub fn is_resolved(&self) -> bool {
		matches!(self, Dependency::Resolved { .. })
	}
}

/// Normalize a declared plugin name to its id.
///
/// `cfgrc-plugin-foo` becomes `foo`, `@scope/cfgrc-plugin` becomes `@scope`
/// and `@scope/cfgrc-plugin-foo` becomes `@scope/foo`.
pub fn normalize_plugin_id(name: &str) -> String {
	if let Some(scoped) = name.strip_prefix('@')
		&& let Some((scope, rest)) = scoped.split_once('/')
	{
		return match rest.strip_prefix(PLUGIN_PREFIX) {
			Some("") => format!("@{scope}"),
			Some(suffix) => match suffix.strip_prefix('-') {
				Some(short) => format!("@{scope}/{short}"),
				None => name.to_string(),
			},
			None => name.to_string(),
		};
	}

	match name.strip_prefix(PLUGIN_PREFIX).and_then(|s| s.strip_prefix('-')) {
		Some(short) if !short.is_empty() => short.to_string(),
		_ => name.to_string(),
	}
}

/// Split a qualified `plugin/member` id. Scoped plugins keep their scope.
pub fn split_qualified_id(id: &str) -> Option<(&str, &str)> {
	if id.starts_with('@') {
		let (plugin, member) = id.rsplit_once('/')?;
		return (plugin.len() > 1).then_some((plugin, member));
	}
	id.split_once('/')
}
