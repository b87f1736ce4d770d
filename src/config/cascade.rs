use crate::config::fragment::ConfigFragment;
use crate::config::loader::FragmentLoader;
use crate::config::source::{ConfigSource, FsConfigSource};
use crate::config::stack::{ConfigLayerStack, StackBuilder, StackId, is_root};
use crate::config::types::ConfigData;
use crate::error::{CfgrcError, Result};
use crate::extract::{ConfigExtractor, ExtractedConfig};
use crate::plugins::{ModuleResolver, PluginPool};
use crate::rules::registry::Registry;
use crate::rules::schema::{BasicSchemaValidator, SchemaValidator};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
///
/// The filesystem is not consulted, so symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
	let mut normalized = PathBuf::new();
	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => match normalized.components().next_back() {
				Some(Component::Normal(_)) => {
					normalized.pop();
				}
				Some(Component::RootDir | Component::Prefix(_)) => {}
				_ => normalized.push(".."),
			},
			other => normalized.push(other.as_os_str()),
		}
	}
	normalized
}

/// Inputs that shape every resolution.
#[derive(Debug, Clone)]
pub struct CascadeOptions {
	/// Directory relative paths and CLI patterns resolve against.
	pub cwd: PathBuf,

	/// Settings below every config file (`BaseConfig`).
	pub base_config: Option<ConfigData>,

	/// Settings above every config file (`CLIOptions`).
	pub cli_config: Option<ConfigData>,

	/// File given with `--config`.
	pub specific_config_path: Option<PathBuf>,

	/// Ignore file used instead of `.cfgignore` in `cwd`.
	pub ignore_path: Option<PathBuf>,

	/// Whether to read an ignore file at all.
	pub use_ignore_file: bool,

	/// `--rulesdir` directories.
	pub rule_paths: Vec<PathBuf>,

	/// Whether to look for config files in the directory hierarchy.
	pub use_cascade: bool,

	/// Home directory; `None` disables the home boundary and the personal config.
	pub home_dir: Option<PathBuf>,
}

impl Default for CascadeOptions {
	fn default() -> Self {
		CascadeOptions {
			cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
			base_config: None,
			cli_config: None,
			specific_config_path: None,
			ignore_path: None,
			use_ignore_file: true,
			rule_paths: Vec::new(),
			use_cascade: true,
			home_dir: dirs::home_dir(),
		}
	}
}

/// A deprecated personal-config behavior that was hit while resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deprecation {
	/// The home directory config was skipped because a subdirectory has configs.
	PersonalConfigSuppressed(PathBuf),
	/// The home directory config was applied to a file outside the home directory.
	PersonalConfigLoaded(PathBuf),
}

impl fmt::Display for Deprecation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Deprecation::PersonalConfigSuppressed(path) => write!(
				f,
				"'{}' is ignored because a config file exists in a subdirectory; personal config in the home directory is deprecated",
				path.display()
			),
			Deprecation::PersonalConfigLoaded(path) => write!(
				f,
				"'{}' is loaded as a personal config for a file outside the home directory; personal config is deprecated",
				path.display()
			),
		}
	}
}

/// A directory stack with the personal and CLI layers appended.
#[derive(Debug, Clone)]
struct Finalized {
	stack: ConfigLayerStack,
	/// The home config file, when it was appended as `PersonalConfig`.
	personal_config: Option<PathBuf>,
}

/// Resolves the effective configuration of files by walking their directories.
///
/// Every query reuses the per-directory and per-stack caches. Call
/// [`clear_cache`](CascadeResolver::clear_cache) after the module pool changes.
pub struct CascadeResolver {
	options: CascadeOptions,
	source: Box<dyn ConfigSource>,
	modules: Arc<dyn ModuleResolver>,
	registry: Arc<Registry>,
	base_stack: ConfigLayerStack,
	cli_layers: Vec<Arc<ConfigFragment>>,
	directory_cache: HashMap<PathBuf, ConfigLayerStack>,
	finalize_cache: HashMap<StackId, Finalized>,
	extractor: ConfigExtractor,
	warnings: Vec<Deprecation>,
}

impl CascadeResolver {
	pub fn new(
		mut options: CascadeOptions,
		source: Box<dyn ConfigSource>,
		modules: Arc<dyn ModuleResolver>,
		registry: Arc<Registry>,
		validator: Arc<dyn SchemaValidator>,
	) -> Result<Self> {
		options.cwd = normalize_path(&options.cwd);
		options.home_dir = options.home_dir.as_deref().map(normalize_path);

		let loader = FragmentLoader::new(source.as_ref(), modules.as_ref(), &registry);
		let base_stack = build_base_stack(&options, &loader)?;
		let cli_layers = build_cli_layers(&options, &loader, source.as_ref())?;

		Ok(CascadeResolver {
			extractor: ConfigExtractor::new(Arc::clone(&registry), validator),
			options,
			source,
			modules,
			registry,
			base_stack,
			cli_layers,
			directory_cache: HashMap::new(),
			finalize_cache: HashMap::new(),
			warnings: Vec::new(),
		})
	}

	/// A resolver reading from disk with an empty plugin pool.
	pub fn with_defaults(options: CascadeOptions) -> Result<Self> {
		Self::new(
			options,
			Box::new(FsConfigSource),
			Arc::new(PluginPool::new()),
			Arc::new(Registry::with_builtin_environments()),
			Arc::new(BasicSchemaValidator),
		)
	}

	pub fn options(&self) -> &CascadeOptions {
		&self.options
	}

	/// The stack every directory stack starts from.
	pub fn base_layers(&self) -> &ConfigLayerStack {
		&self.base_stack
	}

	/// Deprecations hit so far, each reported once.
	pub fn warnings(&self) -> &[Deprecation] {
		&self.warnings
	}

	/// The finalized stack for `file_path`. Fails when no config file applies.
	pub fn resolve(&mut self, file_path: &Path) -> Result<ConfigLayerStack> {
		self.resolve_with(file_path, false)
	}

	/// The finalized stack for `file_path`; the file need not exist.
	pub fn resolve_with(&mut self, file_path: &Path, ignore_not_found: bool) -> Result<ConfigLayerStack> {
		let path = self.absolute(file_path);
		let directory = path.parent().unwrap_or(&path).to_path_buf();

		let directory_stack = if self.options.use_cascade {
			self.load_in_ancestors(&directory, true, false)?
		} else {
			self.base_stack.clone()
		};
		self.finalize(directory_stack, &directory, ignore_not_found)
	}

	/// The effective config for `file_path`.
	pub fn config_for_file(&mut self, file_path: &Path) -> Result<Arc<ExtractedConfig>> {
		let path = self.absolute(file_path);
		let stack = self.resolve(&path)?;
		self.extractor.extract(&stack, &path)
	}

	/// Validate every layer that can apply to `file_path`, overrides included.
	pub fn validate_file(&mut self, file_path: &Path) -> Result<ConfigLayerStack> {
		let stack = self.resolve(file_path)?;
		self.extractor.validate(&stack)?;
		Ok(stack)
	}

	/// Rebuild the base and CLI layers and drop every cache.
	pub fn clear_cache(&mut self) -> Result<()> {
		let loader = FragmentLoader::new(self.source.as_ref(), self.modules.as_ref(), &self.registry);
		let base_stack = build_base_stack(&self.options, &loader)?;
		let cli_layers = build_cli_layers(&self.options, &loader, self.source.as_ref())?;

		self.base_stack = base_stack;
		self.cli_layers = cli_layers;
		self.directory_cache.clear();
		self.finalize_cache.clear();
		self.extractor.clear();
		debug!("Cleared config caches");
		Ok(())
	}

	/// Absolute, normalized form of `path`, relative to `cwd`.
	pub fn absolute(&self, path: &Path) -> PathBuf {
		if path.is_absolute() {
			normalize_path(path)
		} else {
			normalize_path(&self.options.cwd.join(path))
		}
	}

	fn loader(&self) -> FragmentLoader<'_> {
		FragmentLoader::new(self.source.as_ref(), self.modules.as_ref(), &self.registry)
	}

	fn load_in_ancestors(&mut self, dir: &Path, is_initial: bool, configs_exist_in_subdirs: bool) -> Result<ConfigLayerStack> {
		// Checked before the cache: the home entry only holds home's own stack.
		if !is_initial && self.options.home_dir.as_deref() == Some(dir) {
			debug!(dir = %dir.display(), "Stopping at home directory");
			if configs_exist_in_subdirs && let Some(path) = self.source.config_path_in(dir) {
				self.deprecate(Deprecation::PersonalConfigSuppressed(path));
			}
			return Ok(self.base_stack.clone());
		}

		if let Some(stack) = self.directory_cache.get(dir) {
			debug!(dir = %dir.display(), "Directory cache hit");
			return Ok(stack.clone());
		}

		let loaded = self.loader().load_directory(dir);
		let fragments = match loaded {
			Ok(fragments) => fragments,
			Err(e) if e.is_permission_denied() => {
				debug!(dir = %dir.display(), "Stopping at unreadable directory");
				self.directory_cache.insert(dir.to_path_buf(), self.base_stack.clone());
				return Ok(self.base_stack.clone());
			}
			Err(e) => return Err(e),
		};

		if is_root(&fragments) {
			debug!(dir = %dir.display(), "Stopping at root config");
			let stack = self.base_stack.to_builder().extend(fragments).build();
			self.directory_cache.insert(dir.to_path_buf(), stack.clone());
			return Ok(stack);
		}

		let parent_stack = match dir.parent() {
			Some(parent) => self.load_in_ancestors(parent, false, configs_exist_in_subdirs || !fragments.is_empty())?,
			None => self.base_stack.clone(),
		};

		let stack = if fragments.is_empty() {
			parent_stack
		} else {
			parent_stack.to_builder().extend(fragments).build()
		};
		self.directory_cache.insert(dir.to_path_buf(), stack.clone());
		Ok(stack)
	}

	fn finalize(&mut self, directory_stack: ConfigLayerStack, directory: &Path, ignore_not_found: bool) -> Result<ConfigLayerStack> {
		let finalized = match self.finalize_cache.get(&directory_stack.id()) {
			Some(finalized) => finalized.clone(),
			None => {
				let finalized = self.build_finalized(&directory_stack)?;
				self.finalize_cache.insert(directory_stack.id(), finalized.clone());
				finalized
			}
		};

		// Depends on the queried directory, so it is not part of the cached result.
		let outside_home = self
			.options
			.home_dir
			.as_deref()
			.is_some_and(|home| !directory.starts_with(home));
		if outside_home && let Some(path) = &finalized.personal_config {
			self.deprecate(Deprecation::PersonalConfigLoaded(path.clone()));
		}

		if self.options.use_cascade && !ignore_not_found && !finalized.stack.has_config_file() {
			return Err(CfgrcError::ConfigNotFound {
				directory: directory.to_path_buf(),
			});
		}
		Ok(finalized.stack)
	}

	fn build_finalized(&self, directory_stack: &ConfigLayerStack) -> Result<Finalized> {
		let mut personal = Vec::new();
		let mut personal_config = None;
		let cli_has_file = self.cli_layers.iter().any(|layer| layer.file_path.is_some());
		if self.options.use_cascade
			&& !cli_has_file
			&& !directory_stack.has_config_file()
			&& let Some(home) = &self.options.home_dir
			&& let Some(path) = self.source.config_path_in(home)
		{
			debug!(path = %path.display(), "Loading personal config");
			personal = self.loader().load_file(&path, Some("PersonalConfig"))?;
			personal_config = Some(path);
		}

		let stack = if personal.is_empty() && self.cli_layers.is_empty() {
			directory_stack.clone()
		} else {
			directory_stack
				.to_builder()
				.extend(personal)
				.extend(self.cli_layers.iter().cloned())
				.build()
		};
		Ok(Finalized { stack, personal_config })
	}

	fn deprecate(&mut self, deprecation: Deprecation) {
		if self.warnings.contains(&deprecation) {
			return;
		}
		warn!("{deprecation}");
		self.warnings.push(deprecation);
	}
}

/// Default ignore patterns, then `BaseConfig`, then the `--rulesdir` plugin.
fn build_base_stack(options: &CascadeOptions, loader: &FragmentLoader<'_>) -> Result<ConfigLayerStack> {
	let mut builder = StackBuilder::new().push(loader.default_ignore_layer(&options.cwd)?);
	if let Some(data) = &options.base_config {
		builder = builder.extend(loader.load_data(data.clone(), "BaseConfig", &options.cwd)?);
	}
	if !options.rule_paths.is_empty() {
		builder = builder.push(loader.rules_dir_layer(&options.rule_paths, &options.cwd));
	}
	Ok(builder.build())
}

/// `--config` fragments, then the ignore file, then `CLIOptions`.
fn build_cli_layers(options: &CascadeOptions, loader: &FragmentLoader<'_>, source: &dyn ConfigSource) -> Result<Vec<Arc<ConfigFragment>>> {
	let mut layers = Vec::new();

	if let Some(path) = &options.specific_config_path {
		let path = normalize_path(&options.cwd.join(path));
		layers.extend(loader.load_file(&path, Some("--config"))?);
	}

	if options.use_ignore_file {
		let ignore_file = match &options.ignore_path {
			Some(path) => {
				let path = normalize_path(&options.cwd.join(path));
				let patterns = source.load_ignore_file(&path)?;
				Some((path, patterns))
			}
			None => source.default_ignore_file(&options.cwd)?,
		};
		if let Some((path, patterns)) = ignore_file {
			layers.push(loader.ignore_file_layer(&path, &patterns)?);
		}
	}

	if let Some(data) = &options.cli_config {
		layers.extend(loader.load_data(data.clone(), "CLIOptions", &options.cwd)?);
	}

	Ok(layers)
}
