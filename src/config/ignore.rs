use crate::error::{CfgrcError, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Ignore patterns that apply to every run unless re-included.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &["/**/node_modules/*", "/**/.git/*"];

/// One fragment's ignore patterns, compiled against the fragment's directory.
#[derive(Debug, Clone)]
pub struct IgnorePatterns {
	base_path: PathBuf,
	patterns: Vec<String>,
	matcher: Gitignore,
}

impl IgnorePatterns {
	pub fn new(patterns: &[String], base_path: &Path) -> Result<Self> {
		let mut builder = GitignoreBuilder::new(base_path);
		for pattern in patterns {
			builder
				.add_line(None, pattern)
				.map_err(|source| CfgrcError::InvalidIgnorePattern {
					pattern: pattern.clone(),
					source,
				})?;
		}
		let matcher = builder.build().map_err(|source| CfgrcError::InvalidIgnorePattern {
			pattern: patterns.join(", "),
			source,
		})?;

		Ok(IgnorePatterns {
			base_path: base_path.to_path_buf(),
			patterns: patterns.to_vec(),
			matcher,
		})
	}

	pub fn patterns(&self) -> &[String] {
		&self.patterns
	}

	/// `Some(true)` if ignored, `Some(false)` if re-included, `None` if no pattern matched.
	fn decide(&self, path: &Path, is_dir: bool) -> Option<bool> {
		if !path.starts_with(&self.base_path) {
			return None;
		}
		let matched = self.matcher.matched_path_or_any_parents(path, is_dir);
		if matched.is_ignore() {
			Some(true)
		} else if matched.is_whitelist() {
			Some(false)
		} else {
			None
		}
	}
}

/// Ordered ignore pattern groups from every merged layer.
///
/// Later groups win, so a closer config can re-include a path with `!pattern`.
#[derive(Debug, Clone, Default)]
pub struct IgnorePredicate {
	groups: Vec<Arc<IgnorePatterns>>,
}

impl IgnorePredicate {
	pub fn push(&mut self, group: Arc<IgnorePatterns>) {
		self.groups.push(group);
	}

	/// Whether `path` (absolute) is ignored.
	pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
		self.groups
			.iter()
			.filter_map(|group| group.decide(path, is_dir))
			.last()
			.unwrap_or(false)
	}

	/// All patterns in precedence order.
	pub fn patterns(&self) -> Vec<String> {
		self.groups
			.iter()
			.flat_map(|group| group.patterns().iter().cloned())
			.collect()
	}

	/// Patterns with the leading default set removed.
	pub fn user_patterns(&self) -> Vec<String> {
		let mut patterns = self.patterns();
		let has_defaults = patterns.len() >= DEFAULT_IGNORE_PATTERNS.len()
			&& patterns
				.iter()
				.zip(DEFAULT_IGNORE_PATTERNS)
				.all(|(actual, default)| actual == default);
		if has_defaults {
			patterns.drain(..DEFAULT_IGNORE_PATTERNS.len());
		}
		patterns
	}
}
