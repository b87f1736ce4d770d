use crate::config::cascade::normalize_path;
use crate::config::fragment::{ConfigFragment, OverrideBlock};
use crate::config::ignore::{DEFAULT_IGNORE_PATTERNS, IgnorePatterns};
use crate::config::matcher::OverrideTester;
use crate::config::source::ConfigSource;
use crate::config::types::{ConfigData, SourceFile};
use crate::error::{CfgrcError, ModuleKind, Result};
use crate::plugins::{Dependency, ModuleResolver, PluginDefinition, normalize_plugin_id};
use crate::rules::registry::{Registry, RuleDefinition};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name and location a fragment is being loaded under.
///
/// `base_path` anchors override and ignore patterns. Extended files keep the
/// importer's `base_path`, so their patterns match the importer's files.
#[derive(Debug, Clone)]
struct LoadContext {
	name: String,
	file_path: Option<PathBuf>,
	base_path: PathBuf,
}

impl LoadContext {
	/// Directory that relative `extends` entries resolve from.
	fn resolve_dir(&self) -> &Path {
		self.file_path
			.as_deref()
			.and_then(Path::parent)
			.unwrap_or(&self.base_path)
	}
}

/// Loads fragments and everything they extend.
///
/// Every load returns the extended fragments first and the loaded fragment
/// last, so later entries take precedence.
pub struct FragmentLoader<'a> {
	source: &'a dyn ConfigSource,
	modules: &'a dyn ModuleResolver,
	registry: &'a Registry,
}

impl<'a> FragmentLoader<'a> {
	pub fn new(source: &'a dyn ConfigSource, modules: &'a dyn ModuleResolver, registry: &'a Registry) -> Self {
		FragmentLoader {
			source,
			modules,
			registry,
		}
	}

	/// Load the config file in `dir`. Empty when the directory has none.
	pub fn load_directory(&self, dir: &Path) -> Result<Vec<Arc<ConfigFragment>>> {
		let Some(SourceFile { data, path }) = self.source.load_directory(dir)? else {
			return Ok(Vec::new());
		};
		debug!(path = %path.display(), "Loaded config file");

		let ctx = LoadContext {
			name: path.display().to_string(),
			file_path: Some(path.clone()),
			base_path: dir.to_path_buf(),
		};
		let mut chain = vec![path];
		self.normalize(data, &ctx, &mut chain)
	}

	/// Load an explicit config file. `name` defaults to the path.
	pub fn load_file(&self, path: &Path, name: Option<&str>) -> Result<Vec<Arc<ConfigFragment>>> {
		let name = name.map_or_else(|| path.display().to_string(), str::to_string);
		let base_path = path.parent().unwrap_or_else(|| Path::new("/"));
		self.load_file_in_chain(path, &name, base_path, &mut Vec::new())
	}

	/// Load in-memory settings such as a base config or CLI options.
	pub fn load_data(&self, data: ConfigData, name: &str, base_path: &Path) -> Result<Vec<Arc<ConfigFragment>>> {
		let ctx = LoadContext {
			name: name.to_string(),
			file_path: None,
			base_path: base_path.to_path_buf(),
		};
		self.normalize(data, &ctx, &mut Vec::new())
	}

	/// The lowest layer of every stack: the default ignore patterns.
	pub fn default_ignore_layer(&self, cwd: &Path) -> Result<Arc<ConfigFragment>> {
		let patterns: Vec<String> = DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect();
		let mut fragment = ConfigFragment::new("DefaultIgnorePattern", None, cwd);
		fragment.ignore_patterns = Some(Arc::new(IgnorePatterns::new(&patterns, cwd)?));
		Ok(Arc::new(fragment))
	}

	/// A fragment holding the patterns of an ignore file.
	pub fn ignore_file_layer(&self, path: &Path, patterns: &[String]) -> Result<Arc<ConfigFragment>> {
		let base_path = path.parent().unwrap_or_else(|| Path::new("/"));
		let name = path
			.file_name()
			.map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string());
		let mut fragment = ConfigFragment::new(name, Some(path.to_path_buf()), base_path);
		fragment.ignore_patterns = Some(Arc::new(IgnorePatterns::new(patterns, base_path)?));
		Ok(Arc::new(fragment))
	}

	/// Pseudo-plugin with an empty id holding the rules of every `--rulesdir`.
	///
	/// A directory that fails to load turns the whole plugin into a deferred failure.
	pub fn rules_dir_layer(&self, dirs: &[PathBuf], cwd: &Path) -> Arc<ConfigFragment> {
		let loaded = dirs.iter().try_fold(BTreeMap::new(), |mut rules, dir| -> Result<BTreeMap<String, Arc<RuleDefinition>>> {
			rules.extend(self.modules.load_rules_dir(&cwd.join(dir))?);
			Ok(rules)
		});
		let definition = loaded.map(|rules| {
			Arc::new(PluginDefinition {
				rules,
				..Default::default()
			})
		});

		let mut fragment = ConfigFragment::new("--rulesdir", None, cwd);
		fragment.plugins.insert(
			String::new(),
			Dependency::capture(ModuleKind::RulesDir, "", "--rulesdir", definition),
		);
		Arc::new(fragment)
	}

	fn load_file_in_chain(
		&self,
		path: &Path,
		name: &str,
		base_path: &Path,
		chain: &mut Vec<PathBuf>,
	) -> Result<Vec<Arc<ConfigFragment>>> {
		if chain.iter().any(|p| p == path) {
			return Err(CfgrcError::CircularExtends {
				origin: name.to_string(),
				path: path.to_path_buf(),
			});
		}

		debug!(path = %path.display(), name, "Loading config file");
		let data = self.source.load_file(path)?;
		let ctx = LoadContext {
			name: name.to_string(),
			file_path: Some(path.to_path_buf()),
			base_path: base_path.to_path_buf(),
		};

		chain.push(path.to_path_buf());
		let result = self.normalize(data, &ctx, chain);
		chain.pop();
		result
	}

	fn normalize(&self, data: ConfigData, ctx: &LoadContext, chain: &mut Vec<PathBuf>) -> Result<Vec<Arc<ConfigFragment>>> {
		if !data.files.is_empty() || !data.excluded_files.is_empty() {
			return Err(CfgrcError::InvalidConfig {
				origin: ctx.name.clone(),
				message: "'files' and 'excluded-files' are only allowed inside 'overrides'".to_string(),
			});
		}

		let mut fragments = self.load_extends(&data.extends, ctx, chain)?;
		fragments.push(Arc::new(self.build_fragment(data, ctx, chain)?));
		Ok(fragments)
	}

	fn build_fragment(&self, data: ConfigData, ctx: &LoadContext, chain: &mut Vec<PathBuf>) -> Result<ConfigFragment> {
		let mut fragment = ConfigFragment::new(ctx.name.clone(), ctx.file_path.clone(), &ctx.base_path);
		fragment.root = data.root;
		fragment.env = data.env;
		fragment.globals = data.globals;
		fragment.rules = data.rules;
		fragment.settings = data.settings;
		fragment.parser_options = data.parser_options;
		fragment.processor = data.processor;
		fragment.no_inline_config = data.no_inline_config;
		fragment.report_unused_disable_directives = data.report_unused_disable_directives;

		fragment.parser = data.parser.map(|name| {
			let resolved = self.modules.resolve_parser(&name, &ctx.base_path);
			Dependency::capture(ModuleKind::Parser, &name, &ctx.name, resolved)
		});

		for name in &data.plugins {
			let id = normalize_plugin_id(name);
			let resolved = self.modules.resolve_plugin(&id, &ctx.base_path);
			if let Err(e) = &resolved {
				debug!(plugin = %id, importer = %ctx.name, error = %e, "Deferring plugin failure");
			}
			let dependency = Dependency::capture(ModuleKind::Plugin, &id, &ctx.name, resolved);
			fragment.plugins.insert(id, dependency);
		}

		if !data.ignore_patterns.is_empty() {
			fragment.ignore_patterns = Some(Arc::new(IgnorePatterns::new(&data.ignore_patterns, &ctx.base_path)?));
		}

		for (index, block) in data.overrides.into_iter().enumerate() {
			fragment.overrides.push(self.load_override(block, ctx, index, chain)?);
		}

		Ok(fragment)
	}

	fn load_override(&self, data: ConfigData, parent: &LoadContext, index: usize, chain: &mut Vec<PathBuf>) -> Result<OverrideBlock> {
		let name = format!("{}#overrides[{index}]", parent.name);
		if data.root.is_some() || !data.ignore_patterns.is_empty() {
			return Err(CfgrcError::InvalidConfig {
				origin: name,
				message: "'root' and 'ignore-patterns' are not allowed inside 'overrides'".to_string(),
			});
		}
		if data.files.is_empty() {
			return Err(CfgrcError::InvalidConfig {
				origin: name,
				message: "override blocks require 'files'".to_string(),
			});
		}

		let tester = OverrideTester::new(&data.files, &data.excluded_files, &parent.base_path, &name)?;
		let ctx = LoadContext {
			name,
			file_path: parent.file_path.clone(),
			base_path: parent.base_path.clone(),
		};

		let mut layers = self.load_extends(&data.extends, &ctx, chain)?;
		layers.push(Arc::new(self.build_fragment(data, &ctx, chain)?));
		Ok(OverrideBlock::new(tester, layers))
	}

	fn load_extends(&self, entries: &[String], ctx: &LoadContext, chain: &mut Vec<PathBuf>) -> Result<Vec<Arc<ConfigFragment>>> {
		let mut fragments = Vec::new();
		for entry in entries {
			fragments.extend(self.load_extends_entry(entry, ctx, chain)?);
		}
		Ok(fragments)
	}

	fn load_extends_entry(&self, entry: &str, ctx: &LoadContext, chain: &mut Vec<PathBuf>) -> Result<Vec<Arc<ConfigFragment>>> {
		let name = format!("{} » {entry}", ctx.name);
		let not_found = || CfgrcError::ExtendsNotFound {
			origin: ctx.name.clone(),
			target: entry.to_string(),
		};

		if let Some(preset) = entry.strip_prefix("builtin:") {
			let data = self.builtin_preset(preset).ok_or_else(not_found)?;
			return self.normalize(data, &preset_context(name, ctx), chain);
		}

		if let Some(reference) = entry.strip_prefix("plugin:") {
			let (plugin, config) = reference.rsplit_once('/').ok_or_else(not_found)?;
			let id = normalize_plugin_id(plugin);
			let definition = self.modules.resolve_plugin(&id, &ctx.base_path)?;
			let data = definition.configs.get(config).cloned().ok_or_else(not_found)?;
			return self.normalize(data, &preset_context(name, ctx), chain);
		}

		let path = if is_path_like(entry) {
			normalize_path(&ctx.resolve_dir().join(entry))
		} else {
			self.modules
				.resolve_shared_config(entry, ctx.resolve_dir())
				.map_err(|_| not_found())?
		};

		self.load_file_in_chain(&path, &name, &ctx.base_path, chain).map_err(|e| match e {
			CfgrcError::ConfigReadError { ref source, .. } if source.kind() == ErrorKind::NotFound => not_found(),
			other => other,
		})
	}

	fn builtin_preset(&self, preset: &str) -> Option<ConfigData> {
		let include: fn(&RuleDefinition) -> bool = match preset {
			"recommended" => |rule| rule.recommended,
			"all" => |rule| !rule.deprecated,
			_ => return None,
		};

		let rules = self
			.registry
			.rules()
			.filter(|(_, rule)| include(rule))
			.map(|(id, _)| (id.clone(), Value::from("error")))
			.collect();
		Some(ConfigData {
			rules,
			..Default::default()
		})
	}
}

fn preset_context(name: String, importer: &LoadContext) -> LoadContext {
	LoadContext {
		name,
		file_path: None,
		base_path: importer.base_path.clone(),
	}
}

fn is_path_like(entry: &str) -> bool {
	entry.starts_with("./")
		|| entry.starts_with("../")
		|| Path::new(entry).is_absolute()
		|| entry.ends_with(".toml")
}
