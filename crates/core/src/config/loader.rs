//! Configuration file loader for the `.tomation/` directory structure.
//!
//! This module provides functionality to load and parse all configuration files
//! from the `.tomation/` directory, including:
//! - `config.toml`: Global settings
//! - `tests/*.yaml`: Test scripts

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use std::collections::HashSet;
use std::path::Path;
use tm_protocol::config_models::GlobalConfig;
use tm_protocol::script_models::TestScript;
use tracing::debug;
use walkdir::WalkDir;

/// Name of the project directory holding configuration and tests.
pub const CONFIG_DIR: &str = ".tomation";

/// Loads all configuration from the `.tomation/` directory.
///
/// This function scans the `.tomation/` directory and loads:
/// - Global configuration from `config.toml`
/// - Test scripts from `tests/*.yaml` and `tests/*.yml` files
///
/// # Arguments
///
/// * `root` - Root directory containing the `.tomation/` folder
///
/// # Returns
///
/// An `AppConfig` containing all loaded configuration. If directories or files
/// are missing, returns an empty/default configuration rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid TOML or YAML syntax
/// - Two test scripts declare the same id
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let tm_dir = root.join(CONFIG_DIR);

    if !tm_dir.exists() {
        debug!(path = %tm_dir.display(), "No configuration directory, using defaults");
        return Ok(AppConfig::default());
    }

    let global = load_global_config(&tm_dir)?;
    let tests = load_tests(&tm_dir)?;

    debug!(tests = tests.len(), "Loaded configuration");

    Ok(AppConfig { global, tests })
}

/// Loads global configuration from `config.toml`.
fn load_global_config(tm_dir: &Path) -> ConfigResult<GlobalConfig> {
    let config_path = tm_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    let config: GlobalConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path,
            source,
        })?;

    Ok(config)
}

/// Loads all test scripts from `tests/*.yaml`.
fn load_tests(tm_dir: &Path) -> ConfigResult<Vec<TestScript>> {
    let tests_dir = tm_dir.join("tests");

    if !tests_dir.exists() {
        return Ok(Vec::new());
    }

    let mut tests = Vec::new();
    let mut seen = HashSet::new();

    for entry in WalkDir::new(&tests_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: tests_dir.clone(),
            source,
        })?;

        let path = entry.path();

        let ext = path.extension().and_then(|s| s.to_str());
        if ext != Some("yaml") && ext != Some("yml") {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let script: TestScript =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
                path: path.to_path_buf(),
                source,
            })?;

        if !seen.insert(script.id.clone()) {
            return Err(ConfigError::InvalidConfig {
                path: path.to_path_buf(),
                reason: format!("duplicate test id '{}'", script.id),
            });
        }

        tests.push(script);
    }

    Ok(tests)
}
