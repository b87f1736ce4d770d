use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cfgrc::config::fragment::collect_matching_overrides;
use cfgrc::config::{CascadeOptions, CascadeResolver, ConfigData};

const INIT_TEMPLATE: &str = r#"# cfgrc configuration
#
# Config files are merged from the file's directory up to the nearest
# config with `root = true`. Closer files take precedence.

root = true

# extends = ["builtin:recommended"]

[env]
es2020 = true

[rules]
# Severity is "off", "warn" or "error" (or 0, 1, 2).
# Options follow the severity: quotes = ["error", "double"]
eqeqeq = "error"

# [[overrides]]
# files = ["*.test.js"]
# excluded-files = ["fixtures/**"]
# [overrides.rules]
# eqeqeq = "off"
"#;

#[derive(Parser)]
#[command(name = "cfgrc")]
#[command(
	author,
	version,
	about = "Resolve the effective cascading configuration for source files"
)]
#[command(arg_required_else_help = true)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	/// Create a template .cfgrc.toml in the current directory
	#[arg(long)]
	init: bool,

	/// Overwrite existing .cfgrc.toml when using --init
	#[arg(long, requires = "init")]
	force: bool,

	#[command(flatten)]
	options: ResolveArgs,
}

#[derive(Subcommand)]
enum Commands {
	/// Configuration inspection commands
	Config {
		#[command(subcommand)]
		action: ConfigAction,
	},
}

#[derive(Subcommand)]
enum ConfigAction {
	/// Print the effective configuration for a file as JSON
	Print { file: PathBuf },
	/// List the layers that apply to a file, lowest precedence first
	Show { file: PathBuf },
	/// Check every config that applies to the given files
	Validate {
		#[arg(required = true)]
		files: Vec<PathBuf>,
	},
}

#[derive(Args)]
struct ResolveArgs {
	/// Disable config file lookup in the directory hierarchy
	#[arg(long, global = true)]
	no_cascade: bool,

	/// Use this config file in addition to the cascade
	#[arg(short = 'c', long = "config", global = true, value_name = "FILE")]
	config_file: Option<PathBuf>,

	/// Ignore file to use instead of .cfgignore
	#[arg(long, global = true, value_name = "FILE")]
	ignore_path: Option<PathBuf>,

	/// Do not read an ignore file
	#[arg(long, global = true)]
	no_ignore: bool,

	/// Rule setting, e.g. semi=error or 'quotes=["error","double"]'
	#[arg(long = "rule", global = true, value_name = "ID=VALUE")]
	rules: Vec<String>,

	/// Environment to enable
	#[arg(long = "env", global = true, value_name = "NAME")]
	envs: Vec<String>,

	/// Global variable, optionally with :writable or :readonly
	#[arg(long = "global", global = true, value_name = "NAME[:ACCESS]")]
	globals: Vec<String>,

	/// Parser module name
	#[arg(long, global = true)]
	parser: Option<String>,

	/// Plugin to load
	#[arg(long = "plugin", global = true, value_name = "NAME")]
	plugins: Vec<String>,

	/// Directory with additional rule definitions
	#[arg(long = "rulesdir", global = true, value_name = "DIR")]
	rules_dirs: Vec<PathBuf>,

	/// Ignore pattern, in addition to those from config and ignore files
	#[arg(long = "ignore-pattern", global = true, value_name = "PATTERN")]
	ignore_patterns: Vec<String>,

	/// Disable inline configuration comments
	#[arg(long, global = true)]
	no_inline_config: bool,

	/// Report disable directives that suppress nothing
	#[arg(long, global = true)]
	report_unused_disable_directives: bool,
}

impl ResolveArgs {
	fn cascade_options(&self) -> Result<CascadeOptions> {
		Ok(CascadeOptions {
			cwd: std::env::current_dir().context("Failed to get current directory")?,
			cli_config: Some(self.cli_config()?),
			specific_config_path: self.config_file.clone(),
			ignore_path: self.ignore_path.clone(),
			use_ignore_file: !self.no_ignore,
			rule_paths: self.rules_dirs.clone(),
			use_cascade: !self.no_cascade,
			..Default::default()
		})
	}

	fn cli_config(&self) -> Result<ConfigData> {
		let mut data = ConfigData {
			parser: self.parser.clone(),
			plugins: self.plugins.clone(),
			ignore_patterns: self.ignore_patterns.clone(),
			no_inline_config: self.no_inline_config.then_some(true),
			report_unused_disable_directives: self.report_unused_disable_directives.then_some(true),
			..Default::default()
		};

		for rule in &self.rules {
			let (id, value) = rule
				.split_once('=')
				.with_context(|| format!("Invalid --rule '{rule}': expected ID=VALUE"))?;
			let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
			data.rules.insert(id.to_string(), value);
		}

		for env in &self.envs {
			data.env.insert(env.clone(), true);
		}

		for global in &self.globals {
			let (name, access) = global.split_once(':').unwrap_or((global.as_str(), "readonly"));
			data.globals.insert(name.to_string(), Value::String(access.to_string()));
		}

		Ok(data)
	}
}

fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(std::io::stderr)
		.init();

	match run() {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:?}");
			ExitCode::FAILURE
		}
	}
}

fn run() -> Result<ExitCode> {
	let cli = Cli::parse();

	// Handle --init
	if cli.init {
		return handle_init(cli.force);
	}

	let Some(command) = cli.command else {
		return Ok(ExitCode::SUCCESS);
	};

	let mut resolver = CascadeResolver::with_defaults(cli.options.cascade_options()?)
		.context("Failed to load base configuration")?;

	match command {
		Commands::Config { action } => match action {
			ConfigAction::Print { file } => handle_config_print(&mut resolver, &file),
			ConfigAction::Show { file } => handle_config_show(&mut resolver, &file),
			ConfigAction::Validate { files } => Ok(handle_config_validate(&mut resolver, &files)),
		},
	}
}

fn handle_init(force: bool) -> Result<ExitCode> {
	let config_path = PathBuf::from(".cfgrc.toml");

	if config_path.exists() && !force {
		anyhow::bail!(".cfgrc.toml already exists. Use --force to overwrite.");
	}

	std::fs::write(&config_path, INIT_TEMPLATE)
		.with_context(|| format!("Failed to write {}", config_path.display()))?;

	println!("Created .cfgrc.toml");
	Ok(ExitCode::SUCCESS)
}

fn handle_config_print(resolver: &mut CascadeResolver, file: &Path) -> Result<ExitCode> {
	let config = resolver
		.config_for_file(file)
		.with_context(|| format!("Failed to resolve configuration for {}", file.display()))?;

	let path = resolver.absolute(file);
	if config.is_ignored(&path, false) {
		eprintln!("note: {} is ignored by the configured ignore patterns", file.display());
	}

	let json = serde_json::to_string_pretty(&config.to_plain_object())?;
	println!("{json}");
	Ok(ExitCode::SUCCESS)
}

fn handle_config_show(resolver: &mut CascadeResolver, file: &Path) -> Result<ExitCode> {
	let stack = resolver
		.resolve(file)
		.with_context(|| format!("Failed to resolve configuration for {}", file.display()))?;
	let path = resolver.absolute(file);

	println!("Layers for {} (lowest precedence first):\n", path.display());
	for (i, layer) in stack.layers().iter().enumerate() {
		println!("  {}. {}", i + 1, layer.name);
		if let Some(ref source) = layer.file_path {
			println!("     source: {}", source.display());
		}
	}

	let mut overrides = Vec::new();
	collect_matching_overrides(stack.layers(), &path, &mut overrides, &mut Vec::new());
	if !overrides.is_empty() {
		println!("\nMatching overrides:\n");
		for layer in &overrides {
			println!("  - {}", layer.name);
		}
	}

	Ok(ExitCode::SUCCESS)
}

fn handle_config_validate(resolver: &mut CascadeResolver, files: &[PathBuf]) -> ExitCode {
	let mut failed = false;

	for file in files {
		match resolver.validate_file(file) {
			Ok(stack) => {
				let sources = stack.layers().iter().filter(|layer| layer.file_path.is_some()).count();
				println!("  {} ({} config files)", file.display(), sources);
			}
			Err(e) => {
				eprintln!("Configuration error: {}: {}", file.display(), e);
				failed = true;
			}
		}
	}

	if failed {
		ExitCode::FAILURE
	} else {
		println!("All configurations are valid.");
		ExitCode::SUCCESS
	}
}
