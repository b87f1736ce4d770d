use crate::error::{CfgrcError, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path, PathBuf};

/// A compiled `files` / `excluded-files` glob.
#[derive(Debug, Clone)]
struct CompiledPattern {
	matcher: GlobMatcher,

	/// Patterns without a `/` match the basename at any depth.
	match_base: bool,
}

impl CompiledPattern {
	fn compile(pattern: &str) -> Result<Self> {
		let trimmed = pattern.strip_prefix("./").unwrap_or(pattern);
		let matcher = GlobBuilder::new(trimmed)
			.literal_separator(true)
			.build()
			.map_err(|source| CfgrcError::InvalidGlob {
				pattern: pattern.to_string(),
				source,
			})?
			.compile_matcher();

		Ok(CompiledPattern {
			matcher,
			match_base: !trimmed.contains('/'),
		})
	}

	fn matches(&self, relative: &str, basename: &str) -> bool {
		if self.match_base {
			self.matcher.is_match(basename)
		} else {
			self.matcher.is_match(relative)
		}
	}
}

/// Decides whether an override block applies to a file.
///
/// Patterns resolve against the owning fragment's directory, so a config keeps
/// applying to the same relative files wherever the run starts.
#[derive(Debug, Clone)]
pub struct OverrideTester {
	base_path: PathBuf,
	files: Vec<CompiledPattern>,
	excluded_files: Vec<CompiledPattern>,
}

impl OverrideTester {
	/// Compile a tester. `origin` names the fragment for error messages.
	pub fn new(files: &[String], excluded_files: &[String], base_path: &Path, origin: &str) -> Result<Self> {
		let compile_all = |patterns: &[String]| -> Result<Vec<CompiledPattern>> {
			patterns
				.iter()
				.map(|pattern| {
					check_relative(pattern, origin)?;
					CompiledPattern::compile(pattern)
				})
				.collect()
		};

		Ok(OverrideTester {
			base_path: base_path.to_path_buf(),
			files: compile_all(files)?,
			excluded_files: compile_all(excluded_files)?,
		})
	}

	/// True when the file matches some `files` glob and no `excluded-files` glob.
	pub fn test(&self, file_path: &Path) -> bool {
		let Ok(relative) = file_path.strip_prefix(&self.base_path) else {
			return false;
		};
		let relative = to_slash(relative);
		let basename = relative.rsplit('/').next().unwrap_or(&relative);

		self.files.iter().any(|p| p.matches(&relative, basename))
			&& !self.excluded_files.iter().any(|p| p.matches(&relative, basename))
	}
}

fn check_relative(pattern: &str, origin: &str) -> Result<()> {
	let path = Path::new(pattern);
	if path.is_absolute()
		|| pattern.starts_with('/')
		|| path.components().any(|c| matches!(c, Component::ParentDir))
	{
		return Err(CfgrcError::InvalidOverridePattern {
			origin: origin.to_string(),
			pattern: pattern.to_string(),
		});
	}
	Ok(())
}

fn to_slash(path: &Path) -> String {
	path.components()
		.filter_map(|c| match c {
			Component::Normal(part) => Some(part.to_string_lossy()),
			_ => None,
		})
		.collect::<Vec<_>>()
		.join("/")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tester(files: &[&str], excluded: &[&str]) -> OverrideTester {
		let files: Vec<String> = files.iter().map(|s| s.to_string()).collect();
		let excluded: Vec<String> = excluded.iter().map(|s| s.to_string()).collect();
		OverrideTester::new(&files, &excluded, Path::new("/proj"), "test.toml").unwrap()
	}

	#[test]
	fn test_basename_pattern_matches_at_any_depth() {
		let t = tester(&["*.test.js"], &[]);
		assert!(t.test(Path::new("/proj/a.test.js")));
		assert!(t.test(Path::new("/proj/src/deep/b.test.js")));
		assert!(!t.test(Path::new("/proj/a.js")));
	}

	#[test]
	fn test_path_pattern_is_relative_to_base() {
		let t = tester(&["src/*.js"], &[]);
		assert!(t.test(Path::new("/proj/src/a.js")));
		assert!(!t.test(Path::new("/proj/src/nested/a.js")));
		assert!(!t.test(Path::new("/proj/lib/src/a.js")));
	}

	#[test]
	fn test_double_star() {
		let t = tester(&["src/**/*.js"], &[]);
		assert!(t.test(Path::new("/proj/src/a.js")));
		assert!(t.test(Path::new("/proj/src/x/y/a.js")));
	}

	#[test]
	fn test_leading_dot_slash_is_ignored() {
		let t = tester(&["./src/*.js"], &[]);
		assert!(t.test(Path::new("/proj/src/a.js")));
	}

	#[test]
	fn test_excluded_files_win() {
		let t = tester(&["*.js"], &["*.test.js"]);
		assert!(t.test(Path::new("/proj/a.js")));
		assert!(!t.test(Path::new("/proj/a.test.js")));
	}

	#[test]
	fn test_case_sensitive() {
		let t = tester(&["*.js"], &[]);
		assert!(!t.test(Path::new("/proj/A.JS")));
	}

	#[test]
	fn test_files_outside_base_never_match() {
		let t = tester(&["*.js"], &[]);
		assert!(!t.test(Path::new("/other/a.js")));
	}

	#[test]
	fn test_rejects_absolute_and_parent_patterns() {
		for pattern in ["/abs/*.js", "../*.js", "src/../*.js"] {
			let result = OverrideTester::new(&[pattern.to_string()], &[], Path::new("/proj"), "test.toml");
			match result.unwrap_err() {
				CfgrcError::InvalidOverridePattern { pattern: p, .. } => assert_eq!(p, pattern),
				other => panic!("Expected InvalidOverridePattern, got {other:?}"),
			}
		}
	}

	#[test]
	fn test_invalid_glob() {
		let result = OverrideTester::new(&["[".to_string()], &[], Path::new("/proj"), "test.toml");
		assert!(matches!(result, Err(CfgrcError::InvalidGlob { .. })));
	}
}
