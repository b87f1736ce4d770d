use crate::config::types::ConfigData;
use crate::error::{CfgrcError, Result};
use std::path::Path;

/// Parse a config file from the given path.
pub fn parse_config_file(path: &Path) -> Result<ConfigData> {
	let content = std::fs::read_to_string(path).map_err(|source| CfgrcError::ConfigReadError {
		path: path.to_path_buf(),
		source,
	})?;

	parse_config_str(&content, path)
}

/// Parse a config from a string (useful for testing).
pub fn parse_config_str(content: &str, path: &Path) -> Result<ConfigData> {
	toml::from_str(content).map_err(|source| CfgrcError::ConfigParseError {
		path: path.to_path_buf(),
		source,
	})
}

/// Parse the lines of an ignore file, dropping blanks and comments.
pub fn parse_ignore_str(content: &str) -> Vec<String> {
	content
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.map(str::to_string)
		.collect()
}
