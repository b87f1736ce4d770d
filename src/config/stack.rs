use crate::config::fragment::ConfigFragment;
use crate::plugins::{Dependency, PluginDefinition, ProcessorDefinition};
use crate::rules::registry::{EnvironmentDefinition, RuleDefinition};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a built stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackId(u64);

/// Members of every plugin in a stack, keyed by qualified id (`plugin/member`).
///
/// Members of the `--rulesdir` pseudo plugin (empty id) are keyed by bare name.
/// When two layers declare the same plugin id, the later declaration wins.
#[derive(Debug, Default)]
pub struct PluginIndexes {
	pub plugins: BTreeMap<String, Dependency<PluginDefinition>>,
	pub rules: BTreeMap<String, Arc<RuleDefinition>>,
	pub environments: BTreeMap<String, Arc<EnvironmentDefinition>>,
	pub processors: BTreeMap<String, Arc<ProcessorDefinition>>,
}

impl PluginIndexes {
	fn build(layers: &[Arc<ConfigFragment>]) -> Self {
		let mut plugins = BTreeMap::new();
		collect_plugins(layers, &mut plugins);

		let mut indexes = PluginIndexes::default();
		for (plugin_id, dependency) in &plugins {
			let Ok(definition) = dependency.definition() else {
				continue;
			};
			for (name, rule) in &definition.rules {
				indexes.rules.insert(qualify(plugin_id, name), Arc::clone(rule));
			}
			for (name, env) in &definition.environments {
				indexes.environments.insert(qualify(plugin_id, name), Arc::clone(env));
			}
			for (name, processor) in &definition.processors {
				indexes.processors.insert(qualify(plugin_id, name), Arc::clone(processor));
			}
		}
		indexes.plugins = plugins;
		indexes
	}
}

fn collect_plugins(layers: &[Arc<ConfigFragment>], out: &mut BTreeMap<String, Dependency<PluginDefinition>>) {
	for layer in layers {
		for (id, dependency) in &layer.plugins {
			out.insert(id.clone(), dependency.clone());
		}
		for block in &layer.overrides {
			collect_plugins(&block.layers, out);
		}
	}
}

fn qualify(plugin_id: &str, name: &str) -> String {
	if plugin_id.is_empty() {
		name.to_string()
	} else {
		format!("{plugin_id}/{name}")
	}
}

#[derive(Debug)]
struct StackInner {
	id: StackId,
	layers: Vec<Arc<ConfigFragment>>,
	indexes: OnceLock<PluginIndexes>,
}

/// An immutable, ordered sequence of fragments. Earlier layers have lower precedence.
///
/// Cloning is cheap and preserves identity; only a [`StackBuilder`] makes new stacks.
#[derive(Debug, Clone)]
pub struct ConfigLayerStack {
	inner: Arc<StackInner>,
}

impl ConfigLayerStack {
	pub fn id(&self) -> StackId {
		self.inner.id
	}

	pub fn layers(&self) -> &[Arc<ConfigFragment>] {
		&self.inner.layers
	}

	pub fn len(&self) -> usize {
		self.inner.layers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.layers.is_empty()
	}

	/// Whether both handles point at the same stack.
	pub fn ptr_eq(&self, other: &ConfigLayerStack) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Whether any layer was read from a config file.
	pub fn has_config_file(&self) -> bool {
		self.inner.layers.iter().any(|layer| layer.file_path.is_some())
	}

	/// Start a new stack from a copy of these layers.
	pub fn to_builder(&self) -> StackBuilder {
		StackBuilder {
			layers: self.inner.layers.clone(),
		}
	}

	/// Plugin member indexes, built on first use.
	pub fn plugin_indexes(&self) -> &PluginIndexes {
		self.inner
			.indexes
			.get_or_init(|| PluginIndexes::build(&self.inner.layers))
	}
}

/// Accumulates layers for a stack. Consumed by [`build`](StackBuilder::build).
#[derive(Debug, Default)]
pub struct StackBuilder {
	layers: Vec<Arc<ConfigFragment>>,
}

impl StackBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append at the highest precedence.
	pub fn push(mut self, layer: Arc<ConfigFragment>) -> Self {
		self.layers.push(layer);
		self
	}

	pub fn extend(mut self, layers: impl IntoIterator<Item = Arc<ConfigFragment>>) -> Self {
		self.layers.extend(layers);
		self
	}

	/// Insert below every existing layer.
	pub fn prepend(mut self, layers: &[Arc<ConfigFragment>]) -> Self {
		self.layers.splice(0..0, layers.iter().cloned());
		self
	}

	pub fn build(self) -> ConfigLayerStack {
		ConfigLayerStack {
			inner: Arc::new(StackInner {
				id: StackId(NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed)),
				layers: self.layers,
				indexes: OnceLock::new(),
			}),
		}
	}
}

/// Whether the layers stop the directory cascade: the last explicit `root` wins.
pub fn is_root(layers: &[Arc<ConfigFragment>]) -> bool {
	layers
		.iter()
		.rev()
		.find_map(|layer| layer.root)
		.unwrap_or(false)
}
