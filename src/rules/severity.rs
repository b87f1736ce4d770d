use serde_json::Value;
use std::fmt;

/// Normalized rule severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
	Off = 0,
	Warn = 1,
	Error = 2,
}

impl Severity {
	/// Parse a declared severity: `0`, `1`, `2`, or `off`/`warn`/`error` in any case.
	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::Number(n) => match n.as_u64()? {
				0 => Some(Severity::Off),
				1 => Some(Severity::Warn),
				2 => Some(Severity::Error),
				_ => None,
			},
			Value::String(s) => match s.to_ascii_lowercase().as_str() {
				"off" => Some(Severity::Off),
				"warn" => Some(Severity::Warn),
				"error" => Some(Severity::Error),
				_ => None,
			},
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Severity::Off => "off",
			Severity::Warn => "warn",
			Severity::Error => "error",
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A rule's effective setting: severity plus its options.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSetting {
	pub severity: Severity,
	pub options: Vec<Value>,
}

impl RuleSetting {
	/// Normalize a declared rule value. Returns the offending severity value on failure.
	pub fn from_value(value: &Value) -> Result<Self, Value> {
		let (head, options) = match value {
			Value::Array(items) => match items.split_first() {
				Some((head, rest)) => (head, rest.to_vec()),
				None => return Err(Value::Null),
			},
			other => (other, Vec::new()),
		};

		let severity = Severity::from_value(head).ok_or_else(|| head.clone())?;
		Ok(RuleSetting { severity, options })
	}

	/// Fold a higher-precedence setting on top of this one.
	///
	/// Declared options replace the old ones wholesale; a severity-only entry keeps them.
	pub fn merge_from(&mut self, later: RuleSetting) {
		self.severity = later.severity;
		if !later.options.is_empty() {
			self.options = later.options;
		}
	}

	/// `[severity, ...options]` with the severity spelled out.
	pub fn to_value(&self) -> Value {
		let mut items = Vec::with_capacity(self.options.len() + 1);
		items.push(Value::String(self.severity.as_str().to_string()));
		items.extend(self.options.iter().cloned());
		Value::Array(items)
	}
}
