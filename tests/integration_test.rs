#![allow(deprecated)] // assert_cmd::Command::cargo_bin is deprecated but replacement requires nightly

use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn cfgrc_cmd() -> assert_cmd::Command {
	assert_cmd::Command::cargo_bin("cfgrc").unwrap()
}

fn write(dir: &Path, name: &str, content: &str) {
	let path = dir.join(name);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(path, content).unwrap();
}

// ============================================================================
// CLI flag tests
// ============================================================================

#[test]
fn test_help_flag() {
	cfgrc_cmd()
		.arg("--help")
		.assert()
		.success()
		.stdout(predicate::str::contains("cascading configuration"));
}

#[test]
fn test_version_flag() {
	cfgrc_cmd()
		.arg("--version")
		.assert()
		.success()
		.stdout(predicate::str::contains("cfgrc"));
}

#[test]
fn test_no_args_shows_help() {
	cfgrc_cmd()
		.assert()
		.failure()
		.stderr(predicate::str::contains("Usage"));
}

// ============================================================================
// --init tests
// ============================================================================

#[test]
fn test_init_creates_config() {
	let temp_dir = tempfile::tempdir().unwrap();
	let config_path = temp_dir.path().join(".cfgrc.toml");

	cfgrc_cmd()
		.arg("--init")
		.current_dir(temp_dir.path())
		.assert()
		.success()
		.stdout(predicate::str::contains("Created .cfgrc.toml"));

	let content = fs::read_to_string(&config_path).unwrap();
	assert!(content.contains("root = true"));
	assert!(content.contains("[rules]"));
}

#[test]
fn test_init_fails_if_exists() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(temp_dir.path(), ".cfgrc.toml", "# existing");

	cfgrc_cmd()
		.arg("--init")
		.current_dir(temp_dir.path())
		.assert()
		.failure()
		.stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_init_force_overwrites() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(temp_dir.path(), ".cfgrc.toml", "# existing");

	cfgrc_cmd()
		.args(["--init", "--force"])
		.current_dir(temp_dir.path())
		.assert()
		.success();

	let content = fs::read_to_string(temp_dir.path().join(".cfgrc.toml")).unwrap();
	assert!(content.contains("root = true"));
}

#[test]
fn test_init_template_is_valid() {
	let temp_dir = tempfile::tempdir().unwrap();

	cfgrc_cmd()
		.arg("--init")
		.current_dir(temp_dir.path())
		.assert()
		.success();

	cfgrc_cmd()
		.args(["config", "validate", "index.js"])
		.current_dir(temp_dir.path())
		.assert()
		.success()
		.stdout(predicate::str::contains("All configurations are valid"));
}

// ============================================================================
// config print tests
// ============================================================================

#[test]
fn test_config_print_merges_cascade() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(
		temp_dir.path(),
		".cfgrc.toml",
		"root = true\n[rules]\nsemi = \"error\"\nquotes = [\"warn\", \"double\"]\n",
	);
	write(temp_dir.path(), "src/.cfgrc.toml", "[rules]\nsemi = \"off\"\nquotes = 2\n");

	cfgrc_cmd()
		.args(["config", "print", "src/app.js"])
		.current_dir(temp_dir.path())
		.assert()
		.success()
		.stdout(predicate::str::contains(r#""semi": ["#).and(predicate::str::contains(r#""off""#)))
		.stdout(predicate::str::contains(r#""double""#));
}

#[test]
fn test_config_print_applies_overrides() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(
		temp_dir.path(),
		".cfgrc.toml",
		r#"
root = true

[rules]
eqeqeq = "error"

[[overrides]]
files = ["*.test.js"]

[overrides.rules]
eqeqeq = "warn"
"#,
	);

	cfgrc_cmd()
		.args(["config", "print", "lib/a.test.js"])
		.current_dir(temp_dir.path())
		.assert()
		.success()
		.stdout(predicate::str::contains(r#""warn""#))
		.stdout(predicate::str::contains(r#""error""#).not());
}

#[test]
fn test_config_print_cli_rule_wins() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(temp_dir.path(), ".cfgrc.toml", "root = true\n[rules]\nsemi = \"error\"\n");

	cfgrc_cmd()
		.args(["config", "print", "a.js", "--rule", "semi=warn"])
		.current_dir(temp_dir.path())
		.assert()
		.success()
		.stdout(predicate::str::contains(r#""warn""#))
		.stdout(predicate::str::contains(r#""error""#).not());
}

#[test]
fn test_config_print_notes_ignored_file() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(temp_dir.path(), ".cfgrc.toml", "root = true\nignore-patterns = [\"dist/\"]\n");

	cfgrc_cmd()
		.args(["config", "print", "dist/bundle.js"])
		.current_dir(temp_dir.path())
		.assert()
		.success()
		.stderr(predicate::str::contains("is ignored"))
		.stdout(predicate::str::contains(r#""dist/""#));
}

#[test]
fn test_config_print_no_cascade_needs_no_config() {
	let temp_dir = tempfile::tempdir().unwrap();

	cfgrc_cmd()
		.args(["config", "print", "a.js", "--no-cascade"])
		.current_dir(temp_dir.path())
		.assert()
		.success();
}

// ============================================================================
// config show tests
// ============================================================================

#[test]
fn test_config_show_lists_layers() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(
		temp_dir.path(),
		".cfgrc.toml",
		"root = true\n[[overrides]]\nfiles = [\"*.ts\"]\n[overrides.rules]\nsemi = \"off\"\n",
	);
	write(temp_dir.path(), "pkg/.cfgrc.toml", "[rules]\nsemi = \"error\"\n");

	cfgrc_cmd()
		.args(["config", "show", "pkg/index.ts"])
		.current_dir(temp_dir.path())
		.assert()
		.success()
		.stdout(predicate::str::contains("DefaultIgnorePattern"))
		.stdout(predicate::str::contains("CLIOptions"))
		.stdout(predicate::str::contains("pkg/.cfgrc.toml"))
		.stdout(predicate::str::contains("#overrides[0]"));
}

// ============================================================================
// config validate tests
// ============================================================================

#[test]
fn test_config_validate_valid() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(temp_dir.path(), ".cfgrc.toml", "root = true\n[env]\nnode = true\n");

	cfgrc_cmd()
		.args(["config", "validate", "a.js", "b/c.js"])
		.current_dir(temp_dir.path())
		.assert()
		.success()
		.stdout(predicate::str::contains("All configurations are valid"));
}

#[test]
fn test_config_validate_invalid_severity() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(temp_dir.path(), ".cfgrc.toml", "root = true\n[rules]\nsemi = \"loud\"\n");

	cfgrc_cmd()
		.args(["config", "validate", "a.js"])
		.current_dir(temp_dir.path())
		.assert()
		.failure()
		.stderr(predicate::str::contains("Configuration error"))
		.stderr(predicate::str::contains("semi"));
}

#[test]
fn test_config_validate_unknown_environment() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(temp_dir.path(), ".cfgrc.toml", "root = true\n[env]\nmars = true\n");

	cfgrc_cmd()
		.args(["config", "validate", "a.js"])
		.current_dir(temp_dir.path())
		.assert()
		.failure()
		.stderr(predicate::str::contains("mars"));
}

#[test]
fn test_config_validate_parse_error() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(temp_dir.path(), ".cfgrc.toml", "root = = true\n");

	cfgrc_cmd()
		.args(["config", "validate", "a.js"])
		.current_dir(temp_dir.path())
		.assert()
		.failure()
		.stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_explicit_config_file() {
	let temp_dir = tempfile::tempdir().unwrap();
	write(temp_dir.path(), ".cfgrc.toml", "root = true\n[rules]\nsemi = \"error\"\n");
	write(temp_dir.path(), "ci/strict.toml", "[rules]\nsemi = \"warn\"\n");

	cfgrc_cmd()
		.args(["config", "show", "a.js", "-c", "ci/strict.toml"])
		.current_dir(temp_dir.path())
		.assert()
		.success()
		.stdout(predicate::str::contains("--config"));
}

#[test]
fn test_config_print_without_config_fails() {
	let temp_dir = tempfile::tempdir().unwrap();

	cfgrc_cmd()
		.args(["config", "print", "a.js"])
		.current_dir(temp_dir.path())
		.env("HOME", temp_dir.path().join("home"))
		.assert()
		.failure()
		.stderr(predicate::str::contains("No configuration found"));
}
