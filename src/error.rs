use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Kind of module a [`CfgrcError::ModuleNotFound`] or dependency failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
	Plugin,
	Parser,
	SharedConfig,
	RulesDir,
}

impl fmt::Display for ModuleKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ModuleKind::Plugin => "plugin",
			ModuleKind::Parser => "parser",
			ModuleKind::SharedConfig => "shared config",
			ModuleKind::RulesDir => "rules directory",
		};
		f.write_str(name)
	}
}

/// Library-level structured errors for cfgrc.
///
/// Use `thiserror` for structured errors that library consumers can match on.
/// The CLI binary wraps these with `anyhow` for rich context chains.
#[derive(Debug, thiserror::Error)]
pub enum CfgrcError {
	#[error("No configuration found in {directory} or any of its ancestors")]
	ConfigNotFound { directory: PathBuf },

	#[error("Failed to read config file: {path}")]
	ConfigReadError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse config file: {path}")]
	ConfigParseError {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("{origin}: {message}")]
	InvalidConfig { origin: String, message: String },

	#[error("{origin}: failed to load config \"{target}\" to extend from")]
	ExtendsNotFound { origin: String, target: String },

	#[error("{origin}: circular extends detected at {path}")]
	CircularExtends { origin: String, path: PathBuf },

	#[error("{origin}: invalid override pattern \"{pattern}\" (expected relative path not containing '..')")]
	InvalidOverridePattern { origin: String, pattern: String },

	#[error("Invalid glob pattern: {pattern}")]
	InvalidGlob {
		pattern: String,
		#[source]
		source: globset::Error,
	},

	#[error("Invalid ignore pattern: {pattern}")]
	InvalidIgnorePattern {
		pattern: String,
		#[source]
		source: ignore::Error,
	},

	#[error(
		"{origin}: configuration for rule \"{rule_id}\" is invalid: severity should be one of 0, 1, 2, \"off\", \"warn\", \"error\" (got {value})"
	)]
	InvalidSeverity {
		origin: String,
		rule_id: String,
		value: String,
	},

	#[error("{origin}: configuration for rule \"{rule_id}\" is invalid: {}", errors.join("; "))]
	InvalidSchema {
		origin: String,
		rule_id: String,
		errors: Vec<String>,
	},

	#[error("{origin}: environment key \"{env}\" is unknown")]
	UnknownEnvironment { origin: String, env: String },

	#[error("{origin}: processor \"{processor}\" was not found")]
	UnknownProcessor { origin: String, processor: String },

	#[error(
		"{origin}: '{value}' is not a valid configuration for global \"{name}\" (use 'readonly', 'writable', or 'off')"
	)]
	InvalidGlobal {
		origin: String,
		name: String,
		value: String,
	},

	#[error("Cannot find {kind} \"{name}\" relative to {from}")]
	ModuleNotFound {
		kind: ModuleKind,
		name: String,
		from: PathBuf,
	},

	#[error("Failed to load {kind} \"{id}\" declared in \"{importer}\"")]
	DependencyResolution {
		kind: ModuleKind,
		id: String,
		importer: String,
		#[source]
		source: Arc<CfgrcError>,
	},
}

impl CfgrcError {
	/// Whether this error came from a permission-denied filesystem lookup.
	pub fn is_permission_denied(&self) -> bool {
		matches!(
			self,
			CfgrcError::ConfigReadError { source, .. }
				if source.kind() == std::io::ErrorKind::PermissionDenied
		)
	}
}

/// Result type alias using CfgrcError.
pub type Result<T> = std::result::Result<T, CfgrcError>;
