use crate::config::parser::{parse_config_file, parse_ignore_str};
use crate::config::types::{ConfigData, SourceFile};
use crate::error::{CfgrcError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Config file names looked up in each directory, in priority order.
pub const CONFIG_FILENAMES: &[&str] = &[".cfgrc.toml", ".cfgrc"];

/// Ignore file read from the working directory by default.
pub const IGNORE_FILENAME: &str = ".cfgignore";

/// Reads and parses configuration from storage.
///
/// Errors propagate unchanged; the resolver only treats permission-denied
/// failures from [`load_directory`](ConfigSource::load_directory) specially.
pub trait ConfigSource {
	/// The config file in `dir`, if there is one.
	fn load_directory(&self, dir: &Path) -> Result<Option<SourceFile>>;

	fn load_file(&self, path: &Path) -> Result<ConfigData>;

	/// Path of the config file in `dir` without loading it.
	fn config_path_in(&self, dir: &Path) -> Option<PathBuf>;

	fn load_ignore_file(&self, path: &Path) -> Result<Vec<String>>;

	/// The ignore file in `cwd`, if there is one.
	fn default_ignore_file(&self, cwd: &Path) -> Result<Option<(PathBuf, Vec<String>)>>;
}

/// Reads `.cfgrc.toml` / `.cfgrc` (TOML) and `.cfgignore` from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsConfigSource;

impl ConfigSource for FsConfigSource {
	fn load_directory(&self, dir: &Path) -> Result<Option<SourceFile>> {
		for name in CONFIG_FILENAMES {
			let path = dir.join(name);
			match std::fs::metadata(&path) {
				Ok(metadata) if metadata.is_file() => {
					let data = parse_config_file(&path)?;
					return Ok(Some(SourceFile { data, path }));
				}
				Ok(_) => {}
				Err(e) if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::NotADirectory => {}
				Err(source) => return Err(CfgrcError::ConfigReadError { path, source }),
			}
		}
		Ok(None)
	}

	fn load_file(&self, path: &Path) -> Result<ConfigData> {
		parse_config_file(path)
	}

	fn config_path_in(&self, dir: &Path) -> Option<PathBuf> {
		CONFIG_FILENAMES
			.iter()
			.map(|name| dir.join(name))
			.find(|path| path.is_file())
	}

	fn load_ignore_file(&self, path: &Path) -> Result<Vec<String>> {
		let content = std::fs::read_to_string(path).map_err(|source| CfgrcError::ConfigReadError {
			path: path.to_path_buf(),
			source,
		})?;
		Ok(parse_ignore_str(&content))
	}

	fn default_ignore_file(&self, cwd: &Path) -> Result<Option<(PathBuf, Vec<String>)>> {
		let path = cwd.join(IGNORE_FILENAME);
		if !path.is_file() {
			return Ok(None);
		}
		let patterns = self.load_ignore_file(&path)?;
		Ok(Some((path, patterns)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	#[test]
	fn test_load_directory_without_config() {
		let temp_dir = tempfile::tempdir().unwrap();
		assert!(FsConfigSource.load_directory(temp_dir.path()).unwrap().is_none());
		assert!(FsConfigSource.config_path_in(temp_dir.path()).is_none());
	}

	#[test]
	fn test_load_directory_prefers_toml_extension() {
		let temp_dir = tempfile::tempdir().unwrap();
		fs::write(temp_dir.path().join(".cfgrc"), "root = false").unwrap();
		fs::write(temp_dir.path().join(".cfgrc.toml"), "root = true").unwrap();

		let found = FsConfigSource.load_directory(temp_dir.path()).unwrap().unwrap();
		assert_eq!(found.path, temp_dir.path().join(".cfgrc.toml"));
		assert_eq!(found.data.root, Some(true));
	}

	#[test]
	fn test_load_directory_propagates_parse_errors() {
		let temp_dir = tempfile::tempdir().unwrap();
		fs::write(temp_dir.path().join(".cfgrc"), "root = = true").unwrap();

		let result = FsConfigSource.load_directory(temp_dir.path());
		assert!(matches!(result, Err(CfgrcError::ConfigParseError { .. })));
	}

	#[test]
	fn test_default_ignore_file() {
		let temp_dir = tempfile::tempdir().unwrap();
		assert!(FsConfigSource.default_ignore_file(temp_dir.path()).unwrap().is_none());

		fs::write(temp_dir.path().join(IGNORE_FILENAME), "dist/\n# comment\n").unwrap();
		let (path, patterns) = FsConfigSource.default_ignore_file(temp_dir.path()).unwrap().unwrap();
		assert_eq!(path, temp_dir.path().join(IGNORE_FILENAME));
		assert_eq!(patterns, vec!["dist/"]);
	}
}
