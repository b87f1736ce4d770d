use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Settings object from a `.cfgrc.toml` file, a shared config, or CLI options.
///
/// This is the plain data a fragment carries before any reference is resolved.
/// `files` and `excluded-files` are only meaningful inside `overrides`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigData {
	/// If true, stop the directory cascade at this config.
	#[serde(default)]
	pub root: Option<bool>,

	/// Configs this one builds on. Later entries override earlier ones.
	#[serde(default, deserialize_with = "one_or_many")]
	pub extends: Vec<String>,

	/// Environments to enable or disable.
	#[serde(default)]
	pub env: BTreeMap<String, bool>,

	/// Global variable declarations, validated later.
	#[serde(default)]
	pub globals: BTreeMap<String, Value>,

	/// Rule settings: a severity, or an array of severity followed by options.
	#[serde(default)]
	pub rules: BTreeMap<String, Value>,

	/// Shared settings handed to every rule.
	#[serde(default)]
	pub settings: Map<String, Value>,

	/// Parser module name.
	pub parser: Option<String>,

	#[serde(default)]
	pub parser_options: Map<String, Value>,

	/// Plugin names. `cfgrc-plugin-` prefixes are optional.
	#[serde(default)]
	pub plugins: Vec<String>,

	/// Processor id in `plugin/processor` form.
	pub processor: Option<String>,

	/// Gitignore-style patterns relative to this config's directory.
	#[serde(default, deserialize_with = "one_or_many")]
	pub ignore_patterns: Vec<String>,

	pub no_inline_config: Option<bool>,

	pub report_unused_disable_directives: Option<bool>,

	/// Per-file override blocks.
	#[serde(default)]
	pub overrides: Vec<ConfigData>,

	#[serde(default, deserialize_with = "one_or_many")]
	pub files: Vec<String>,

	#[serde(default, deserialize_with = "one_or_many")]
	pub excluded_files: Vec<String>,
}

/// A config file found by probing a directory.
#[derive(Debug, Clone)]
pub struct SourceFile {
	/// The parsed configuration.
	pub data: ConfigData,

	/// The path this config was loaded from.
	pub path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
	One(String),
	Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match OneOrMany::deserialize(deserializer)? {
		OneOrMany::One(value) => vec![value],
		OneOrMany::Many(values) => values,
	})
}
