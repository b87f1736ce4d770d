use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the resolver needs to know about a rule.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleDefinition {
	/// Options schema. An array lists positional option schemas.
	#[serde(default)]
	pub schema: Option<Value>,

	/// Part of the `builtin:recommended` preset.
	#[serde(default)]
	pub recommended: bool,

	/// Left out of the `builtin:all` preset.
	#[serde(default)]
	pub deprecated: bool,
}

/// An environment: a named bundle of globals and parser options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentDefinition {
	pub globals: BTreeMap<String, Value>,
	pub parser_options: Map<String, Value>,
}

impl EnvironmentDefinition {
	fn with_globals(readonly: &[&str], writable: &[&str]) -> Self {
		let mut globals = BTreeMap::new();
		for name in readonly {
			globals.insert(name.to_string(), Value::Bool(false));
		}
		for name in writable {
			globals.insert(name.to_string(), Value::Bool(true));
		}
		EnvironmentDefinition {
			globals,
			parser_options: Map::new(),
		}
	}

	fn with_ecma_version(mut self, version: u64) -> Self {
		self.parser_options
			.insert("ecma-version".to_string(), Value::from(version));
		self
	}
}

/// Core rules and environments, looked up by id.
///
/// Plugin-provided rules and environments live in each stack's plugin index instead.
#[derive(Debug, Clone, Default)]
pub struct Registry {
	rules: BTreeMap<String, Arc<RuleDefinition>>,
	environments: BTreeMap<String, Arc<EnvironmentDefinition>>,
}

impl Registry {
	/// An empty registry with the built-in environments.
	pub fn with_builtin_environments() -> Self {
		let mut registry = Registry::default();
		registry.register_environment(
			"builtin",
			EnvironmentDefinition::with_globals(
				&["Array", "Boolean", "Date", "Error", "JSON", "Math", "Number", "Object", "RegExp", "String"],
				&[],
			),
		);
		registry.register_environment(
			"es6",
			EnvironmentDefinition::with_globals(&["Map", "Promise", "Proxy", "Reflect", "Set", "Symbol", "WeakMap", "WeakSet"], &[])
				.with_ecma_version(6),
		);
		registry.register_environment(
			"es2017",
			EnvironmentDefinition::with_globals(&["Atomics", "SharedArrayBuffer"], &[]).with_ecma_version(8),
		);
		registry.register_environment(
			"es2020",
			EnvironmentDefinition::with_globals(&["BigInt", "globalThis"], &[]).with_ecma_version(11),
		);
		registry.register_environment(
			"browser",
			EnvironmentDefinition::with_globals(&["document", "navigator", "window"], &["location", "onload"]),
		);
		registry.register_environment(
			"node",
			EnvironmentDefinition::with_globals(&["__dirname", "__filename", "process", "require"], &["exports", "module"]),
		);
		registry
	}

	pub fn register_rule(&mut self, id: impl Into<String>, definition: RuleDefinition) {
		self.rules.insert(id.into(), Arc::new(definition));
	}

	pub fn register_environment(&mut self, id: impl Into<String>, definition: EnvironmentDefinition) {
		self.environments.insert(id.into(), Arc::new(definition));
	}

	pub fn rule(&self, id: &str) -> Option<&Arc<RuleDefinition>> {
		self.rules.get(id)
	}

	pub fn environment(&self, id: &str) -> Option<&Arc<EnvironmentDefinition>> {
		self.environments.get(id)
	}

	pub fn rules(&self) -> impl Iterator<Item = (&String, &Arc<RuleDefinition>)> {
		self.rules.iter()
	}
}
