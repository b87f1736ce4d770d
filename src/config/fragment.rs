use crate::config::ignore::IgnorePatterns;
use crate::config::matcher::OverrideTester;
use crate::plugins::{Dependency, ParserDefinition, PluginDefinition};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FRAGMENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_OVERRIDE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a loaded fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(u64);

/// Process-unique identity of an override block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverrideId(u64);

/// One loaded unit of configuration.
///
/// Created once by the loader and shared by every stack that includes it.
#[derive(Debug)]
pub struct ConfigFragment {
	id: FragmentId,

	/// Origin identifier used in diagnostics: a file path or a synthetic name.
	pub name: String,

	/// The config file this fragment was read from, if any.
	pub file_path: Option<PathBuf>,

	/// Directory that relative patterns resolve against.
	pub base_path: PathBuf,

	pub root: Option<bool>,
	pub env: BTreeMap<String, bool>,
	pub globals: BTreeMap<String, Value>,
	pub rules: BTreeMap<String, Value>,
	pub settings: Map<String, Value>,
	pub parser: Option<Dependency<ParserDefinition>>,
	pub parser_options: Map<String, Value>,
	pub plugins: BTreeMap<String, Dependency<PluginDefinition>>,
	pub processor: Option<String>,
	pub ignore_patterns: Option<Arc<IgnorePatterns>>,
	pub no_inline_config: Option<bool>,
	pub report_unused_disable_directives: Option<bool>,
	pub overrides: Vec<OverrideBlock>,
}

impl ConfigFragment {
	/// An empty fragment; fill in the public fields before sharing it.
	pub fn new(name: impl Into<String>, file_path: Option<PathBuf>, base_path: &Path) -> Self {
		ConfigFragment {
			id: FragmentId(NEXT_FRAGMENT_ID.fetch_add(1, Ordering::Relaxed)),
			name: name.into(),
			file_path,
			base_path: base_path.to_path_buf(),
			root: None,
			env: BTreeMap::new(),
			globals: BTreeMap::new(),
			rules: BTreeMap::new(),
			settings: Map::new(),
			parser: None,
			parser_options: Map::new(),
			plugins: BTreeMap::new(),
			processor: None,
			ignore_patterns: None,
			no_inline_config: None,
			report_unused_disable_directives: None,
			overrides: Vec::new(),
		}
	}

	pub fn id(&self) -> FragmentId {
		self.id
	}
}

/// Per-file settings nested inside a fragment.
///
/// `layers` holds the configs the block extends followed by the block's own
/// payload; each layer may carry further blocks of its own.
#[derive(Debug)]
pub struct OverrideBlock {
	id: OverrideId,
	pub tester: OverrideTester,
	pub layers: Vec<Arc<ConfigFragment>>,
}

impl OverrideBlock {
	pub fn new(tester: OverrideTester, layers: Vec<Arc<ConfigFragment>>) -> Self {
		OverrideBlock {
			id: OverrideId(NEXT_OVERRIDE_ID.fetch_add(1, Ordering::Relaxed)),
			tester,
			layers,
		}
	}

	pub fn id(&self) -> OverrideId {
		self.id
	}
}

/// Matched override layers for `file_path`, parent before child, in declaration order.
///
/// Each matched block's id is recorded in `matched` so callers can key caches on it.
pub fn collect_matching_overrides(
	fragments: &[Arc<ConfigFragment>],
	file_path: &Path,
	layers: &mut Vec<Arc<ConfigFragment>>,
	matched: &mut Vec<OverrideId>,
) {
	for fragment in fragments {
		collect_from_blocks(&fragment.overrides, file_path, layers, matched);
	}
}

fn collect_from_blocks(
	blocks: &[OverrideBlock],
	file_path: &Path,
	layers: &mut Vec<Arc<ConfigFragment>>,
	matched: &mut Vec<OverrideId>,
) {
	for block in blocks {
		if !block.tester.test(file_path) {
			continue;
		}
		matched.push(block.id());
		for layer in &block.layers {
			layers.push(Arc::clone(layer));
			collect_from_blocks(&layer.overrides, file_path, layers, matched);
		}
	}
}
