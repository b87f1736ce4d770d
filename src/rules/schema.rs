//! Rule options schema checking.
//!
//! The resolver only decides when a schema is checked and against what value;
//! the engine itself sits behind [`SchemaValidator`].

use serde_json::{Map, Value, json};
use std::sync::Arc;

/// A compiled schema: returns one message per violation, empty when valid.
pub type CompiledSchema = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

/// Compiles JSON schemas into reusable checkers.
pub trait SchemaValidator {
	fn compile(&self, schema: &Value) -> CompiledSchema;
}

/// Schema for a rule's options array, derived from the rule's declared schema.
///
/// `None` means the rule accepts any options.
pub fn rule_options_schema(schema: Option<&Value>) -> Option<Value> {
	match schema? {
		Value::Array(items) if items.is_empty() => Some(json!({
			"type": "array",
			"minItems": 0,
			"maxItems": 0,
		})),
		Value::Array(items) => Some(json!({
			"type": "array",
			"items": items,
			"minItems": 0,
			"maxItems": items.len(),
		})),
		other => Some(other.clone()),
	}
}

/// Validator for the subset of JSON Schema that rule option schemas use.
///
/// Supports `type`, `enum`, `const`, `properties`, `required`,
/// `additionalProperties`, `items` (single or positional), `minItems`,
/// `maxItems`, `minimum`, `maximum`, `anyOf` and `oneOf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSchemaValidator;

impl SchemaValidator for BasicSchemaValidator {
	fn compile(&self, schema: &Value) -> CompiledSchema {
		let schema = schema.clone();
		Arc::new(move |value| {
			let mut errors = Vec::new();
			check(&schema, value, "value", &mut errors);
			errors
		})
	}
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
	let Some(schema) = schema.as_object() else {
		if schema == &Value::Bool(false) {
			errors.push(format!("{path} is not allowed"));
		}
		return;
	};

	if let Some(expected) = schema.get("type")
		&& !type_matches(expected, value)
	{
		errors.push(format!("{path} should be {}", describe_type(expected)));
		return;
	}

	if let Some(Value::Array(allowed)) = schema.get("enum")
		&& !allowed.contains(value)
	{
		errors.push(format!("{path} should be equal to one of the allowed values"));
	}

	if let Some(expected) = schema.get("const")
		&& expected != value
	{
		errors.push(format!("{path} should be equal to constant {expected}"));
	}

	if let Some(n) = value.as_f64() {
		if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
			&& n < min
		{
			errors.push(format!("{path} should be >= {min}"));
		}
		if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
			&& n > max
		{
			errors.push(format!("{path} should be <= {max}"));
		}
	}

	match value {
		Value::Array(items) => check_array(schema, items, path, errors),
		Value::Object(object) => check_object(schema, object, path, errors),
		_ => {}
	}

	if let Some(Value::Array(variants)) = schema.get("anyOf") {
		let passing = variants.iter().filter(|s| passes(s, value)).count();
		if passing == 0 {
			errors.push(format!("{path} should match some schema in anyOf"));
		}
	}

	if let Some(Value::Array(variants)) = schema.get("oneOf") {
		let passing = variants.iter().filter(|s| passes(s, value)).count();
		if passing != 1 {
			errors.push(format!("{path} should match exactly one schema in oneOf"));
		}
	}
}

fn check_array(schema: &Map<String, Value>, items: &[Value], path: &str, errors: &mut Vec<String>) {
	if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
		&& (items.len() as u64) < min
	{
		errors.push(format!("{path} should NOT have fewer than {min} items"));
	}
	if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
		&& (items.len() as u64) > max
	{
		errors.push(format!("{path} should NOT have more than {max} items"));
	}

	match schema.get("items") {
		Some(Value::Array(positional)) => {
			for (i, (item_schema, item)) in positional.iter().zip(items).enumerate() {
				check(item_schema, item, &format!("{path}[{i}]"), errors);
			}
		}
		Some(item_schema) => {
			for (i, item) in items.iter().enumerate() {
				check(item_schema, item, &format!("{path}[{i}]"), errors);
			}
		}
		None => {}
	}
}

fn check_object(schema: &Map<String, Value>, object: &Map<String, Value>, path: &str, errors: &mut Vec<String>) {
	if let Some(Value::Array(required)) = schema.get("required") {
		for key in required.iter().filter_map(Value::as_str) {
			if !object.contains_key(key) {
				errors.push(format!("{path} should have required property '{key}'"));
			}
		}
	}

	let properties = schema.get("properties").and_then(Value::as_object);
	for (key, item) in object {
		let child = format!("{path}.{key}");
		match properties.and_then(|p| p.get(key)) {
			Some(property_schema) => check(property_schema, item, &child, errors),
			None => match schema.get("additionalProperties") {
				Some(Value::Bool(false)) => {
					errors.push(format!("{path} should NOT have additional property '{key}'"));
				}
				Some(extra) if extra.is_object() => check(extra, item, &child, errors),
				_ => {}
			},
		}
	}
}

fn passes(schema: &Value, value: &Value) -> bool {
	let mut errors = Vec::new();
	check(schema, value, "", &mut errors);
	errors.is_empty()
}

fn type_matches(expected: &Value, value: &Value) -> bool {
	match expected {
		Value::String(name) => type_name_matches(name, value),
		Value::Array(names) => names
			.iter()
			.filter_map(Value::as_str)
			.any(|name| type_name_matches(name, value)),
		_ => true,
	}
}

fn type_name_matches(name: &str, value: &Value) -> bool {
	match name {
		"null" => value.is_null(),
		"boolean" => value.is_boolean(),
		"string" => value.is_string(),
		"number" => value.is_number(),
		"integer" => value.is_i64() || value.is_u64(),
		"array" => value.is_array(),
		"object" => value.is_object(),
		_ => false,
	}
}

fn describe_type(expected: &Value) -> String {
	match expected {
		Value::Array(names) => names
			.iter()
			.filter_map(Value::as_str)
			.collect::<Vec<_>>()
			.join(","),
		other => other.as_str().unwrap_or("valid").to_string(),
	}
}
