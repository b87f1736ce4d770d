//! Extraction of one effective configuration per file.
//!
//! This module handles:
//! - Folding a layer stack and its matching override blocks into one config
//! - Validation of every fragment before its settings are used
//! - Memoization per stack and per set of matched overrides

pub mod plain;
pub mod validate;

pub use validate::ValidationGate;

use crate::config::fragment::{ConfigFragment, OverrideId, collect_matching_overrides};
use crate::config::ignore::IgnorePredicate;
use crate::config::stack::{ConfigLayerStack, PluginIndexes, StackId};
use crate::error::{CfgrcError, Result};
use crate::plugins::{Dependency, ParserDefinition, PluginDefinition};
use crate::rules::registry::Registry;
use crate::rules::schema::SchemaValidator;
use crate::rules::severity::RuleSetting;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Normalized access level of a global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalAccess {
	Readonly,
	Writable,
	Off,
}

impl GlobalAccess {
	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::Bool(true) => Some(GlobalAccess::Writable),
			Value::Bool(false) | Value::Null => Some(GlobalAccess::Readonly),
			Value::String(s) => match s.as_str() {
				"true" | "writable" | "writeable" => Some(GlobalAccess::Writable),
				"false" | "readonly" | "readable" => Some(GlobalAccess::Readonly),
				"off" => Some(GlobalAccess::Off),
				_ => None,
			},
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			GlobalAccess::Readonly => "readonly",
			GlobalAccess::Writable => "writable",
			GlobalAccess::Off => "off",
		}
	}
}

impl fmt::Display for GlobalAccess {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A boolean setting and the origin name of the layer that set it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagSetting {
	pub value: bool,
	pub source: String,
}

/// The effective configuration for one file. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExtractedConfig {
	pub parser: Option<Dependency<ParserDefinition>>,
	pub parser_options: Map<String, Value>,
	pub env: BTreeMap<String, bool>,
	/// Globals as declared, normalized.
	pub globals: BTreeMap<String, GlobalAccess>,
	/// Globals of enabled environments overlaid with the declared ones.
	pub resolved_globals: BTreeMap<String, GlobalAccess>,
	pub rules: BTreeMap<String, RuleSetting>,
	pub settings: Map<String, Value>,
	pub plugins: BTreeMap<String, Dependency<PluginDefinition>>,
	pub processor: Option<String>,
	pub ignores: IgnorePredicate,
	pub no_inline_config: Option<FlagSetting>,
	pub report_unused_disable_directives: Option<FlagSetting>,
}

impl ExtractedConfig {
	/// The resolved parser, raising a deferred resolution failure.
	pub fn parser_definition(&self) -> Result<Option<&Arc<ParserDefinition>>> {
		self.parser.as_ref().map(Dependency::definition).transpose()
	}

	/// A plugin by id, raising a deferred resolution failure.
	pub fn plugin(&self, id: &str) -> Option<Result<&Arc<PluginDefinition>>> {
		self.plugins.get(id).map(Dependency::definition)
	}

	/// Whether `path` (absolute) is ignored by the merged ignore patterns.
	pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
		self.ignores.is_ignored(path, is_dir)
	}

	pub fn no_inline_config(&self) -> bool {
		self.no_inline_config.as_ref().is_some_and(|flag| flag.value)
	}

	pub fn report_unused_disable_directives(&self) -> bool {
		self.report_unused_disable_directives
			.as_ref()
			.is_some_and(|flag| flag.value)
	}
}

/// Running fold of layers, lowest precedence first.
#[derive(Debug, Clone, Default)]
struct MergeState {
	parser: Option<Dependency<ParserDefinition>>,
	parser_options: Map<String, Value>,
	env: BTreeMap<String, bool>,
	globals: BTreeMap<String, GlobalAccess>,
	rules: BTreeMap<String, RuleSetting>,
	settings: Map<String, Value>,
	plugins: BTreeMap<String, Dependency<PluginDefinition>>,
	processor: Option<String>,
	ignores: IgnorePredicate,
	no_inline_config: Option<FlagSetting>,
	report_unused_disable_directives: Option<FlagSetting>,
}

impl MergeState {
	fn fold(&mut self, layer: &ConfigFragment) -> Result<()> {
		if let Some(parser) = &layer.parser {
			self.parser = Some(parser.clone());
		}
		if let Some(processor) = &layer.processor {
			self.processor = Some(processor.clone());
		}
		if let Some(value) = layer.no_inline_config {
			self.no_inline_config = Some(FlagSetting {
				value,
				source: layer.name.clone(),
			});
		}
		if let Some(value) = layer.report_unused_disable_directives {
			self.report_unused_disable_directives = Some(FlagSetting {
				value,
				source: layer.name.clone(),
			});
		}

		deep_merge(&mut self.parser_options, &layer.parser_options);
		self.env.extend(layer.env.iter().map(|(k, v)| (k.clone(), *v)));
		self.settings
			.extend(layer.settings.iter().map(|(k, v)| (k.clone(), v.clone())));
		self.plugins
			.extend(layer.plugins.iter().map(|(k, v)| (k.clone(), v.clone())));

		for (name, value) in &layer.globals {
			let access = GlobalAccess::from_value(value).ok_or_else(|| CfgrcError::InvalidGlobal {
				origin: layer.name.clone(),
				name: name.clone(),
				value: value.to_string(),
			})?;
			self.globals.insert(name.clone(), access);
		}

		for (rule_id, value) in &layer.rules {
			let setting = RuleSetting::from_value(value).map_err(|bad| CfgrcError::InvalidSeverity {
				origin: layer.name.clone(),
				rule_id: rule_id.clone(),
				value: bad.to_string(),
			})?;
			match self.rules.get_mut(rule_id) {
				Some(existing) => existing.merge_from(setting),
				None => {
					self.rules.insert(rule_id.clone(), setting);
				}
			}
		}

		if let Some(group) = &layer.ignore_patterns {
			self.ignores.push(Arc::clone(group));
		}
		Ok(())
	}

	fn finish(self, indexes: &PluginIndexes, registry: &Registry) -> ExtractedConfig {
		// Enabled environments sit below every declared global and parser option.
		let mut resolved_globals = BTreeMap::new();
		let mut parser_options = Map::new();
		for (env, _) in self.env.iter().filter(|(_, enabled)| **enabled) {
			let definition = indexes
				.environments
				.get(env)
				.or_else(|| registry.environment(env));
			if let Some(definition) = definition {
				for (name, value) in &definition.globals {
					if let Some(access) = GlobalAccess::from_value(value) {
						resolved_globals.insert(name.clone(), access);
					}
				}
				deep_merge(&mut parser_options, &definition.parser_options);
			}
		}
		resolved_globals.extend(self.globals.iter().map(|(k, v)| (k.clone(), *v)));
		deep_merge(&mut parser_options, &self.parser_options);

		ExtractedConfig {
			parser: self.parser,
			parser_options,
			env: self.env,
			globals: self.globals,
			resolved_globals,
			rules: self.rules,
			settings: self.settings,
			plugins: self.plugins,
			processor: self.processor,
			ignores: self.ignores,
			no_inline_config: self.no_inline_config,
			report_unused_disable_directives: self.report_unused_disable_directives,
		}
	}
}

/// Merge `source` into `target`; nested objects merge, anything else replaces.
fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
	for (key, value) in source {
		match (target.get_mut(key), value) {
			(Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
			_ => {
				target.insert(key.clone(), value.clone());
			}
		}
	}
}

/// Collapses stacks into per-file configs.
///
/// The top-level fold is cached per stack; finished configs are cached per
/// stack and set of matched override blocks, so files that match the same
/// overrides share one `Arc`.
pub struct ConfigExtractor {
	registry: Arc<Registry>,
	gate: ValidationGate,
	base_cache: HashMap<StackId, Arc<MergeState>>,
	config_cache: HashMap<(StackId, Vec<OverrideId>), Arc<ExtractedConfig>>,
}

impl ConfigExtractor {
	pub fn new(registry: Arc<Registry>, validator: Arc<dyn SchemaValidator>) -> Self {
		ConfigExtractor {
			registry,
			gate: ValidationGate::new(validator),
			base_cache: HashMap::new(),
			config_cache: HashMap::new(),
		}
	}

	/// The effective config of `file_path` (absolute) under `stack`.
	pub fn extract(&mut self, stack: &ConfigLayerStack, file_path: &Path) -> Result<Arc<ExtractedConfig>> {
		let mut override_layers = Vec::new();
		let mut matched = Vec::new();
		collect_matching_overrides(stack.layers(), file_path, &mut override_layers, &mut matched);

		let key = (stack.id(), matched);
		if let Some(config) = self.config_cache.get(&key) {
			trace!(file = %file_path.display(), "Extraction cache hit");
			return Ok(Arc::clone(config));
		}

		self.gate.validate_stack(stack, &self.registry)?;

		let base = match self.base_cache.get(&stack.id()) {
			Some(base) => Arc::clone(base),
			None => {
				let mut state = MergeState::default();
				for layer in stack.layers() {
					state.fold(layer)?;
				}
				let base = Arc::new(state);
				self.base_cache.insert(stack.id(), Arc::clone(&base));
				base
			}
		};

		let mut state = MergeState::clone(&base);
		for layer in &override_layers {
			state.fold(layer)?;
		}

		let config = Arc::new(state.finish(stack.plugin_indexes(), &self.registry));
		self.config_cache.insert(key, Arc::clone(&config));
		Ok(config)
	}

	/// Validate a whole stack without extracting.
	pub fn validate(&mut self, stack: &ConfigLayerStack) -> Result<()> {
		self.gate.validate_stack(stack, &self.registry)
	}

	/// Drop every cached fold, config and validation result.
	pub fn clear(&mut self) {
		self.base_cache.clear();
		self.config_cache.clear();
		self.gate.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::fragment::OverrideBlock;
	use crate::config::ignore::IgnorePatterns;
	use crate::config::matcher::OverrideTester;
	use crate::config::stack::StackBuilder;
	use crate::error::ModuleKind;
	use crate::rules::schema::BasicSchemaValidator;
	use crate::rules::severity::Severity;
	use serde_json::json;

	fn extractor() -> ConfigExtractor {
		ConfigExtractor::new(
			Arc::new(Registry::with_builtin_environments()),
			Arc::new(BasicSchemaValidator),
		)
	}

	fn fragment(name: &str) -> ConfigFragment {
		ConfigFragment::new(name, None, Path::new("/proj"))
	}

	fn with_rule(mut fragment: ConfigFragment, rule: &str, value: Value) -> ConfigFragment {
		fragment.rules.insert(rule.to_string(), value);
		fragment
	}

	fn block(files: &[&str], excluded: &[&str], layers: Vec<ConfigFragment>) -> OverrideBlock {
		let files: Vec<String> = files.iter().map(|s| s.to_string()).collect();
		let excluded: Vec<String> = excluded.iter().map(|s| s.to_string()).collect();
		let tester = OverrideTester::new(&files, &excluded, Path::new("/proj"), "test").unwrap();
		OverrideBlock::new(tester, layers.into_iter().map(Arc::new).collect())
	}

	fn severity(config: &ExtractedConfig, rule: &str) -> Severity {
		config.rules.get(rule).unwrap().severity
	}

	#[test]
	fn test_override_precedence() {
		let mut own = with_rule(fragment("own"), "no-unused-vars", json!("error"));
		own.overrides.push(block(
			&["*.test.js"],
			&[],
			vec![with_rule(fragment("own#overrides[0]"), "no-unused-vars", json!("off"))],
		));
		let stack = StackBuilder::new().push(Arc::new(own)).build();
		let mut extractor = extractor();

		let test_file = extractor.extract(&stack, Path::new("/proj/a.test.js")).unwrap();
		let plain_file = extractor.extract(&stack, Path::new("/proj/a.js")).unwrap();

		assert_eq!(severity(&test_file, "no-unused-vars"), Severity::Off);
		assert_eq!(severity(&plain_file, "no-unused-vars"), Severity::Error);
	}

	#[test]
	fn test_excluded_files_skip_override() {
		let mut own = with_rule(fragment("own"), "semi", json!("error"));
		own.overrides.push(block(
			&["*.js"],
			&["*.test.js"],
			vec![with_rule(fragment("own#overrides[0]"), "semi", json!("off"))],
		));
		let stack = StackBuilder::new().push(Arc::new(own)).build();
		let mut extractor = extractor();

		let excluded = extractor.extract(&stack, Path::new("/proj/a.test.js")).unwrap();
		assert_eq!(severity(&excluded, "semi"), Severity::Error);
	}

	#[test]
	fn test_overrides_beat_every_top_level_layer() {
		let mut base = fragment("base");
		base.overrides.push(block(
			&["*.js"],
			&[],
			vec![with_rule(fragment("base#overrides[0]"), "semi", json!("warn"))],
		));
		let closer = with_rule(fragment("closer"), "semi", json!("error"));
		let stack = StackBuilder::new()
			.push(Arc::new(base))
			.push(Arc::new(closer))
			.build();

		let config = extractor().extract(&stack, Path::new("/proj/a.js")).unwrap();
		assert_eq!(severity(&config, "semi"), Severity::Warn);
	}

	#[test]
	fn test_nested_overrides_apply_parent_first() {
		let mut payload = with_rule(fragment("payload"), "semi", json!("warn"));
		payload.overrides.push(block(
			&["*.spec.js"],
			&[],
			vec![with_rule(fragment("nested"), "semi", json!("off"))],
		));
		let mut own = with_rule(fragment("own"), "semi", json!("error"));
		own.overrides.push(block(&["src/**/*.js"], &[], vec![payload]));
		let stack = StackBuilder::new().push(Arc::new(own)).build();
		let mut extractor = extractor();

		let spec = extractor.extract(&stack, Path::new("/proj/src/a.spec.js")).unwrap();
		let plain = extractor.extract(&stack, Path::new("/proj/src/a.js")).unwrap();
		let outside = extractor.extract(&stack, Path::new("/proj/lib/a.spec.js")).unwrap();

		assert_eq!(severity(&spec, "semi"), Severity::Off);
		assert_eq!(severity(&plain, "semi"), Severity::Warn);
		// The nested block is never reached when its parent does not match.
		assert_eq!(severity(&outside, "semi"), Severity::Error);
	}

	#[test]
	fn test_fold_rules() {
		let mut low = with_rule(fragment("low"), "quotes", json!(["error", "double"]));
		low.env.insert("node".to_string(), true);
		low.globals.insert("a".to_string(), json!("readonly"));
		low.settings.insert("shared".to_string(), json!({ "x": 1, "y": 2 }));
		low.parser_options.insert("features".to_string(), json!({ "jsx": true, "x": 1 }));
		low.processor = Some("p/one".to_string());
		low.no_inline_config = Some(true);

		let mut high = with_rule(fragment("high"), "quotes", json!("warn"));
		high.env.insert("browser".to_string(), true);
		high.globals.insert("a".to_string(), json!("writable"));
		high.settings.insert("shared".to_string(), json!({ "x": 3 }));
		high.parser_options.insert("features".to_string(), json!({ "x": 2 }));

		let config = MergeStateHarness::fold(&[low, high]);

		let quotes = config.rules.get("quotes").unwrap();
		assert_eq!(quotes.severity, Severity::Warn);
		assert_eq!(quotes.options, vec![json!("double")]);
		assert_eq!(config.env.len(), 2);
		assert_eq!(config.globals.get("a"), Some(&GlobalAccess::Writable));
		// Settings merge per key without deep merging.
		assert_eq!(config.settings.get("shared"), Some(&json!({ "x": 3 })));
		// Parser options merge deeply.
		assert_eq!(config.parser_options.get("features"), Some(&json!({ "jsx": true, "x": 2 })));
		assert_eq!(config.processor.as_deref(), Some("p/one"));
		let flag = config.no_inline_config.as_ref().unwrap();
		assert!(flag.value);
		assert_eq!(flag.source, "low");
	}

	struct MergeStateHarness;

	impl MergeStateHarness {
		fn fold(layers: &[ConfigFragment]) -> ExtractedConfig {
			let mut state = MergeState::default();
			for layer in layers {
				state.fold(layer).unwrap();
			}
			state.finish(&PluginIndexes::default(), &Registry::with_builtin_environments())
		}
	}

	#[test]
	fn test_env_globals_are_expanded() {
		let mut own = fragment("own");
		own.env.insert("node".to_string(), true);
		own.env.insert("browser".to_string(), false);
		own.globals.insert("process".to_string(), json!("off"));
		let stack = StackBuilder::new().push(Arc::new(own)).build();

		let config = extractor().extract(&stack, Path::new("/proj/a.js")).unwrap();
		assert_eq!(config.resolved_globals.get("require"), Some(&GlobalAccess::Readonly));
		assert_eq!(config.resolved_globals.get("module"), Some(&GlobalAccess::Writable));
		assert_eq!(config.resolved_globals.get("process"), Some(&GlobalAccess::Off));
		assert!(!config.resolved_globals.contains_key("window"));
	}

	#[test]
	fn test_env_parser_options_have_lowest_precedence() {
		let base = || {
			let mut base = fragment("base");
			base.env.insert("es6".to_string(), true);
			base.parser_options.insert("source-type".to_string(), json!("module"));
			Arc::new(base)
		};
		let stack = StackBuilder::new().push(base()).build();

		let config = extractor().extract(&stack, Path::new("/proj/a.js")).unwrap();
		assert_eq!(config.parser_options.get("ecma-version"), Some(&json!(6)));
		assert_eq!(config.parser_options.get("source-type"), Some(&json!("module")));

		let mut own = fragment("own");
		own.parser_options.insert("ecma-version".to_string(), json!(2022));
		let stack = StackBuilder::new()
			.push(Arc::new(own))
			.push(base())
			.build();

		let config = extractor().extract(&stack, Path::new("/proj/a.js")).unwrap();
		assert_eq!(config.parser_options.get("ecma-version"), Some(&json!(2022)));
	}

	#[test]
	fn test_ignore_patterns_accumulate() {
		let mut first = fragment("first");
		first.ignore_patterns = Some(Arc::new(IgnorePatterns::new(&["a/".to_string()], Path::new("/proj")).unwrap()));
		let mut second = fragment("second");
		second.ignore_patterns = Some(Arc::new(IgnorePatterns::new(&["b/".to_string()], Path::new("/proj")).unwrap()));
		let stack = StackBuilder::new()
			.push(Arc::new(first))
			.push(Arc::new(second))
			.build();

		let config = extractor().extract(&stack, Path::new("/proj/c.js")).unwrap();
		assert!(config.is_ignored(Path::new("/proj/a/x"), false));
		assert!(config.is_ignored(Path::new("/proj/b/x"), false));
		assert!(!config.is_ignored(Path::new("/proj/c.js"), false));
	}

	#[test]
	fn test_memoized_by_stack_and_matched_overrides() {
		let mut own = fragment("own");
		own.overrides.push(block(
			&["*.test.js"],
			&[],
			vec![with_rule(fragment("o"), "semi", json!("off"))],
		));
		let stack = StackBuilder::new().push(Arc::new(own)).build();
		let mut extractor = extractor();

		let a = extractor.extract(&stack, Path::new("/proj/a.js")).unwrap();
		let b = extractor.extract(&stack, Path::new("/proj/b.js")).unwrap();
		let t = extractor.extract(&stack, Path::new("/proj/a.test.js")).unwrap();

		assert!(Arc::ptr_eq(&a, &b));
		assert!(!Arc::ptr_eq(&a, &t));

		extractor.clear();
		let again = extractor.extract(&stack, Path::new("/proj/a.js")).unwrap();
		assert!(!Arc::ptr_eq(&a, &again));
	}

	#[test]
	fn test_validation_failure_is_not_cached() {
		let bad = with_rule(fragment("/proj/.cfgrc.toml"), "semi", json!("bogus"));
		let stack = StackBuilder::new().push(Arc::new(bad)).build();
		let mut extractor = extractor();

		for _ in 0..2 {
			match extractor.extract(&stack, Path::new("/proj/a.js")).unwrap_err() {
				CfgrcError::InvalidSeverity { origin, .. } => assert_eq!(origin, "/proj/.cfgrc.toml"),
				other => panic!("Expected InvalidSeverity, got {other:?}"),
			}
		}
	}

	#[test]
	fn test_unmatched_override_layers_are_validated() {
		let mut own = fragment("own");
		own.overrides.push(block(
			&["*.test.js"],
			&[],
			vec![with_rule(fragment("own#overrides[0]"), "semi", json!("loud"))],
		));
		let stack = StackBuilder::new().push(Arc::new(own)).build();

		match extractor().extract(&stack, Path::new("/proj/a.js")).unwrap_err() {
			CfgrcError::InvalidSeverity { origin, .. } => assert_eq!(origin, "own#overrides[0]"),
			other => panic!("Expected InvalidSeverity, got {other:?}"),
		}
	}

	#[test]
	fn test_failed_parser_is_raised_on_use_only() {
		let mut own = with_rule(fragment("own"), "semi", json!("error"));
		own.parser = Some(Dependency::capture(
			ModuleKind::Parser,
			"missing",
			"own",
			Err(CfgrcError::ModuleNotFound {
				kind: ModuleKind::Parser,
				name: "missing".to_string(),
				from: Path::new("/proj").to_path_buf(),
			}),
		));
		let stack = StackBuilder::new().push(Arc::new(own)).build();

		let config = extractor().extract(&stack, Path::new("/proj/a.js")).unwrap();
		assert_eq!(severity(&config, "semi"), Severity::Error);
		assert!(matches!(
			config.parser_definition(),
			Err(CfgrcError::DependencyResolution { .. })
		));
	}
}
