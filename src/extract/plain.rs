use crate::extract::ExtractedConfig;
use crate::plugins::Dependency;
use serde_json::{Map, Value, json};

impl ExtractedConfig {
	/// A plain JSON view using the on-disk key names.
	///
	/// Parser and plugins appear as declared identifiers, rules as
	/// `[severity, ...options]`, and the default ignore patterns are left out.
	pub fn to_plain_object(&self) -> Value {
		let globals: Map<String, Value> = self
			.globals
			.iter()
			.map(|(name, access)| (name.clone(), Value::String(access.as_str().to_string())))
			.collect();
		let rules: Map<String, Value> = self
			.rules
			.iter()
			.map(|(id, setting)| (id.clone(), setting.to_value()))
			.collect();
		let plugins: Vec<&str> = self
			.plugins
			.values()
			.map(Dependency::id)
			.filter(|id| !id.is_empty())
			.collect();

		json!({
			"env": self.env,
			"globals": globals,
			"ignore-patterns": self.ignores.user_patterns(),
			"no-inline-config": self.no_inline_config(),
			"parser": self.parser.as_ref().map(Dependency::id),
			"parser-options": self.parser_options,
			"plugins": plugins,
			"processor": self.processor,
			"report-unused-disable-directives": self.report_unused_disable_directives(),
			"rules": rules,
			"settings": self.settings,
		})
	}
}
