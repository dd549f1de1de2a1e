//! Configuration loading and discovery for `playmake.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{
    PlayRuntime, PlaymakeConfig, ProjectConfig, PublishConfig, RuntimeConfig, SceneConfig,
    ToolchainConfig, WatchConfig,
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILENAME: &str = "playmake.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse playmake.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override the play runtime
    pub runtime: Option<PlayRuntime>,
    /// Override the publish target
    pub publish_target: Option<String>,
    /// Override the SDK path
    pub sdk: Option<PathBuf>,
    /// Disable compiler caching
    pub no_cache: Option<bool>,
    /// Override the file server port
    pub port: Option<u16>,
}

/// Find playmake.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find playmake.toml by walking up from a specific directory.
///
/// This is the internal implementation that allows specifying the start directory,
/// useful for testing.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a playmake.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns a default
/// configuration.
pub fn load_config(path: Option<&Path>) -> Result<PlaymakeConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<PlaymakeConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: PlaymakeConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Create a default configuration when no playmake.toml is found.
///
/// The project name is taken from the current directory name.
pub fn default_config() -> PlaymakeConfig {
    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    PlaymakeConfig {
        project: ProjectConfig {
            name: project_name,
            package: "arm".to_string(),
            sources: PathBuf::from("Sources"),
            build_dir: None,
            write_config: true,
        },
        toolchain: ToolchainConfig { node: PathBuf::from("node"), ..Default::default() },
        runtime: RuntimeConfig::default(),
        publish: PublishConfig::default(),
        scene: SceneConfig::default(),
        watch: WatchConfig::default(),
    }
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut PlaymakeConfig, overrides: &CliOverrides) {
    if let Some(runtime) = overrides.runtime {
        config.runtime.play = runtime;
    }

    if let Some(ref target) = overrides.publish_target {
        config.publish.target = target.clone();
    }

    if let Some(ref sdk) = overrides.sdk {
        config.toolchain.sdk = sdk.clone();
    }

    if let Some(true) = overrides.no_cache {
        config.runtime.cache_compiler = false;
    }

    if let Some(port) = overrides.port {
        config.runtime.port = port;
    }
}

/// Get the project root directory from a config file path.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILENAME);
        File::create(&config_path)
            .expect("should create config file")
            .write_all(content.as_bytes())
            .expect("should write config content");
        config_path
    }

    #[test]
    fn test_find_config_in_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[project]\nname = \"test\"");

        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[project]\nname = \"test\"");

        let subdir = temp.path().join("Sources").join("arm");
        fs::create_dir_all(&subdir).expect("should create subdirectories");

        let found = find_config_from(subdir);
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_not_found() {
        let temp = TempDir::new().expect("should create temp dir");
        assert_eq!(find_config_from(temp.path().to_path_buf()), None);
    }

    #[test]
    fn test_load_config_from_file() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(
            temp.path(),
            r#"
[project]
name = "test-project"
package = "game"

[runtime]
play = "native"

[scene]
name = "Intro"
resolution = [800, 600]
"#,
        );

        let config = load_config(Some(&config_path)).expect("should load valid config");
        assert_eq!(config.project.name, "test-project");
        assert_eq!(config.project.package, "game");
        assert_eq!(config.runtime.play, PlayRuntime::Native);
        assert_eq!(config.scene.name, "Intro");
        assert_eq!(config.scene.resolution, [800, 600]);
    }

    #[test]
    fn test_load_config_missing_file_errors() {
        let temp = TempDir::new().expect("should create temp dir");
        let result = load_config(Some(&temp.path().join("nonexistent.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "this is not valid toml {{{");

        let result = load_config(Some(&config_path));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_validation_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(
            temp.path(),
            r#"
[project]
name = ""

[runtime]
port = 0
"#,
        );

        let result = load_config(Some(&config_path));
        match result {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_cli_overrides() {
        let mut config = default_config();
        let overrides = CliOverrides {
            runtime: Some(PlayRuntime::Browser),
            publish_target: Some("krom-windows".to_string()),
            sdk: Some(PathBuf::from("/opt/sdk")),
            no_cache: Some(true),
            port: Some(9090),
        };

        merge_cli_overrides(&mut config, &overrides);
        assert_eq!(config.runtime.play, PlayRuntime::Browser);
        assert_eq!(config.publish.target, "krom-windows");
        assert_eq!(config.toolchain.sdk, PathBuf::from("/opt/sdk"));
        assert!(!config.runtime.cache_compiler);
        assert_eq!(config.runtime.port, 9090);
    }

    #[test]
    fn test_merge_cli_overrides_empty_keeps_config() {
        let mut config = default_config();
        merge_cli_overrides(&mut config, &CliOverrides::default());
        assert_eq!(config.runtime.play, PlayRuntime::Krom);
        assert!(config.runtime.cache_compiler);
    }

    #[test]
    fn test_project_root() {
        let config_path = Path::new("/project/playmake.toml");
        assert_eq!(project_root(config_path), Some(Path::new("/project")));
    }

    #[test]
    fn test_default_config() {
        let config = default_config();
        assert!(!config.project.name.is_empty());
        assert_eq!(config.project.package, "arm");
        assert!(config.validate().is_empty());
    }
}
