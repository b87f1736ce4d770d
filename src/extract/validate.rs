use crate::config::fragment::{ConfigFragment, FragmentId};
use crate::config::stack::{ConfigLayerStack, PluginIndexes};
use crate::error::{CfgrcError, Result};
use crate::extract::GlobalAccess;
use crate::plugins::split_qualified_id;
use crate::rules::registry::{Registry, RuleDefinition};
use crate::rules::schema::{CompiledSchema, SchemaValidator, rule_options_schema};
use crate::rules::severity::{RuleSetting, Severity};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Checks fragments before their settings are used.
///
/// Each fragment is validated at most once, no matter how many stacks share it.
pub struct ValidationGate {
	validator: Arc<dyn SchemaValidator>,
	validated: HashSet<FragmentId>,
	schemas: HashMap<String, Option<CompiledSchema>>,
}

impl ValidationGate {
	pub fn new(validator: Arc<dyn SchemaValidator>) -> Self {
		ValidationGate {
			validator,
			validated: HashSet::new(),
			schemas: HashMap::new(),
		}
	}

	/// Validate every layer of `stack`, including all override layers.
	pub fn validate_stack(&mut self, stack: &ConfigLayerStack, registry: &Registry) -> Result<()> {
		let indexes = stack.plugin_indexes();
		for layer in stack.layers() {
			self.validate_tree(layer, indexes, registry)?;
		}
		Ok(())
	}

	fn validate_tree(&mut self, fragment: &ConfigFragment, indexes: &PluginIndexes, registry: &Registry) -> Result<()> {
		self.validate_fragment(fragment, indexes, registry)?;
		for block in &fragment.overrides {
			for layer in &block.layers {
				self.validate_tree(layer, indexes, registry)?;
			}
		}
		Ok(())
	}

	/// Validate one fragment's own settings; a no-op if it already passed.
	pub fn validate_fragment(&mut self, fragment: &ConfigFragment, indexes: &PluginIndexes, registry: &Registry) -> Result<()> {
		if self.validated.contains(&fragment.id()) {
			return Ok(());
		}
		trace!(fragment = %fragment.name, "Validating fragment");

		for (rule_id, value) in &fragment.rules {
			self.validate_rule(fragment, rule_id, value, indexes, registry)?;
		}

		for env in fragment.env.keys() {
			if registry.environment(env).is_none() && !indexes.environments.contains_key(env) {
				return Err(CfgrcError::UnknownEnvironment {
					origin: fragment.name.clone(),
					env: env.clone(),
				});
			}
		}

		for (name, value) in &fragment.globals {
			if GlobalAccess::from_value(value).is_none() {
				return Err(CfgrcError::InvalidGlobal {
					origin: fragment.name.clone(),
					name: name.clone(),
					value: display_value(value),
				});
			}
		}

		if let Some(processor) = &fragment.processor {
			validate_processor(fragment, processor, indexes)?;
		}

		self.validated.insert(fragment.id());
		Ok(())
	}

	fn validate_rule(
		&mut self,
		fragment: &ConfigFragment,
		rule_id: &str,
		value: &Value,
		indexes: &PluginIndexes,
		registry: &Registry,
	) -> Result<()> {
		let setting = RuleSetting::from_value(value).map_err(|bad| CfgrcError::InvalidSeverity {
			origin: fragment.name.clone(),
			rule_id: rule_id.to_string(),
			value: display_value(&bad),
		})?;

		if setting.severity == Severity::Off {
			return Ok(());
		}
		let Some(definition) = rule_definition(rule_id, indexes, registry) else {
			return Ok(());
		};
		let Some(schema) = self.compiled_schema(rule_id, definition) else {
			return Ok(());
		};

		let errors = schema(&Value::Array(setting.options));
		if errors.is_empty() {
			Ok(())
		} else {
			Err(CfgrcError::InvalidSchema {
				origin: fragment.name.clone(),
				rule_id: rule_id.to_string(),
				errors,
			})
		}
	}

	fn compiled_schema(&mut self, rule_id: &str, definition: &RuleDefinition) -> Option<CompiledSchema> {
		let validator = &self.validator;
		self.schemas
			.entry(rule_id.to_string())
			.or_insert_with(|| rule_options_schema(definition.schema.as_ref()).map(|schema| validator.compile(&schema)))
			.clone()
	}

	/// Forget everything validated so far.
	pub fn clear(&mut self) {
		self.validated.clear();
		self.schemas.clear();
	}
}

/// Look up a rule: plugin and `--rulesdir` rules first, then core rules.
pub fn rule_definition<'a>(rule_id: &str, indexes: &'a PluginIndexes, registry: &'a Registry) -> Option<&'a Arc<RuleDefinition>> {
	indexes.rules.get(rule_id).or_else(|| registry.rule(rule_id))
}

fn validate_processor(fragment: &ConfigFragment, processor: &str, indexes: &PluginIndexes) -> Result<()> {
	if indexes.processors.contains_key(processor) {
		return Ok(());
	}
	if let Some((plugin_id, _)) = split_qualified_id(processor)
		&& let Some(plugin) = indexes.plugins.get(plugin_id)
	{
		plugin.definition()?;
	}
	Err(CfgrcError::UnknownProcessor {
		origin: fragment.name.clone(),
		processor: processor.to_string(),
	})
}

fn display_value(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		Value::Null => "undefined".to_string(),
		other => other.to_string(),
	}
}
