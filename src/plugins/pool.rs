use crate::error::{CfgrcError, ModuleKind, Result};
use crate::plugins::{ParserDefinition, PluginDefinition};
use crate::rules::registry::RuleDefinition;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Resolves plugin, parser and shared-config references by name.
///
/// Implementations may fail; the loader captures plugin and parser failures
/// in a [`Dependency`](crate::plugins::Dependency) instead of raising them.
pub trait ModuleResolver {
	fn resolve_plugin(&self, id: &str, from: &Path) -> Result<Arc<PluginDefinition>>;

	fn resolve_parser(&self, name: &str, from: &Path) -> Result<Arc<ParserDefinition>>;

	/// Path of the config file a shared config name refers to.
	fn resolve_shared_config(&self, name: &str, from: &Path) -> Result<PathBuf>;

	/// Rule definitions found in a `--rulesdir` directory.
	fn load_rules_dir(&self, dir: &Path) -> Result<BTreeMap<String, Arc<RuleDefinition>>>;
}

/// In-memory pool of registered plugins, parsers and shared configs.
///
/// Registration takes `&self` so a host can keep an `Arc` to the pool it handed
/// to the resolver. Call `CascadeResolver::clear_cache` after registering.
#[derive(Debug, Default)]
pub struct PluginPool {
	plugins: RwLock<BTreeMap<String, Arc<PluginDefinition>>>,
	parsers: RwLock<BTreeMap<String, Arc<ParserDefinition>>>,
	shared_configs: RwLock<BTreeMap<String, PathBuf>>,
}

impl PluginPool {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_plugin(&self, id: impl Into<String>, definition: PluginDefinition) {
		self.plugins
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(id.into(), Arc::new(definition));
	}

	pub fn register_parser(&self, name: impl Into<String>, location: Option<PathBuf>) {
		let name = name.into();
		let definition = ParserDefinition {
			name: name.clone(),
			location,
		};
		self.parsers
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(name, Arc::new(definition));
	}

	pub fn register_shared_config(&self, name: impl Into<String>, path: impl Into<PathBuf>) {
		self.shared_configs
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(name.into(), path.into());
	}
}

impl ModuleResolver for PluginPool {
	fn resolve_plugin(&self, id: &str, from: &Path) -> Result<Arc<PluginDefinition>> {
		let plugins = self.plugins.read().unwrap_or_else(PoisonError::into_inner);
		plugins
			.get(id)
			.cloned()
			.ok_or_else(|| CfgrcError::ModuleNotFound {
				kind: ModuleKind::Plugin,
				name: id.to_string(),
				from: from.to_path_buf(),
			})
	}

	fn resolve_parser(&self, name: &str, from: &Path) -> Result<Arc<ParserDefinition>> {
		let parsers = self.parsers.read().unwrap_or_else(PoisonError::into_inner);
		parsers
			.get(name)
			.cloned()
			.ok_or_else(|| CfgrcError::ModuleNotFound {
				kind: ModuleKind::Parser,
				name: name.to_string(),
				from: from.to_path_buf(),
			})
	}

	fn resolve_shared_config(&self, name: &str, from: &Path) -> Result<PathBuf> {
		let configs = self
			.shared_configs
			.read()
			.unwrap_or_else(PoisonError::into_inner);
		configs
			.get(name)
			.cloned()
			.ok_or_else(|| CfgrcError::ModuleNotFound {
				kind: ModuleKind::SharedConfig,
				name: name.to_string(),
				from: from.to_path_buf(),
			})
	}

	/// Each `<rule-id>.toml` file in `dir` is a rule manifest.
	fn load_rules_dir(&self, dir: &Path) -> Result<BTreeMap<String, Arc<RuleDefinition>>> {
		let entries = std::fs::read_dir(dir).map_err(|source| CfgrcError::ConfigReadError {
			path: dir.to_path_buf(),
			source,
		})?;

		let mut rules = BTreeMap::new();
		for entry in entries {
			let path = entry
				.map_err(|source| CfgrcError::ConfigReadError {
					path: dir.to_path_buf(),
					source,
				})?
				.path();
			if path.extension().is_none_or(|ext| ext != "toml") {
				continue;
			}
			let Some(rule_id) = path.file_stem().and_then(|s| s.to_str()) else {
				continue;
			};
			let content =
				std::fs::read_to_string(&path).map_err(|source| CfgrcError::ConfigReadError {
					path: path.clone(),
					source,
				})?;
			let definition: RuleDefinition =
				toml::from_str(&content).map_err(|source| CfgrcError::ConfigParseError {
					path: path.clone(),
					source,
				})?;
			rules.insert(rule_id.to_string(), Arc::new(definition));
		}
		Ok(rules)
	}
}
