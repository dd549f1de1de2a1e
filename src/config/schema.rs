//! Configuration schema types for `playmake.toml`
//!
//! Defines the structure and validation rules for playmake project configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime used by the play command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayRuntime {
    /// Embedded standalone runtime (Krom)
    #[default]
    Krom,
    /// Browser runtime served over the local file server
    Browser,
    /// Native build for the host platform
    Native,
}

impl std::fmt::Display for PlayRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayRuntime::Krom => write!(f, "krom"),
            PlayRuntime::Browser => write!(f, "browser"),
            PlayRuntime::Native => write!(f, "native"),
        }
    }
}

impl std::str::FromStr for PlayRuntime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "krom" => Ok(PlayRuntime::Krom),
            "browser" | "html5" => Ok(PlayRuntime::Browser),
            "native" => Ok(PlayRuntime::Native),
            other => Err(format!("unknown runtime '{}' (expected krom, browser or native)", other)),
        }
    }
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Package name for project scripts (`Sources/<package>`)
    #[serde(default = "default_package")]
    pub package: String,
    /// Root directory for script sources
    #[serde(default = "default_sources")]
    pub sources: PathBuf,
    /// Build output directory (defaults to `build_<name>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_dir: Option<PathBuf>,
    /// Write the companion `Bundled/config.arm` file
    #[serde(default = "default_true")]
    pub write_config: bool,
}

fn default_package() -> String {
    "arm".to_string()
}

fn default_sources() -> PathBuf {
    PathBuf::from("Sources")
}

fn default_true() -> bool {
    true
}

/// External tools invoked by the build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// SDK root containing Kha, Krom and the minifier
    #[serde(default)]
    pub sdk: PathBuf,
    /// Node binary used to run khamake and the minifier
    #[serde(default = "default_node")]
    pub node: PathBuf,
    /// khamake entry script (defaults to `<sdk>/Kha/make`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub khamake: Option<PathBuf>,
    /// ffmpeg binary passed through to khamake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<PathBuf>,
    /// Krom binary (defaults to the SDK's per-OS binary)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub krom: Option<PathBuf>,
    /// JS minifier script (defaults to the SDK's uglifyjs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minifier: Option<PathBuf>,
    /// Extra tokens appended verbatim to every khamake invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_node() -> PathBuf {
    PathBuf::from("node")
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            sdk: PathBuf::new(),
            node: default_node(),
            khamake: None,
            ffmpeg: None,
            krom: None,
            minifier: None,
            extra_args: Vec::new(),
        }
    }
}

/// Runtime and caching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime used by `play`
    #[serde(default)]
    pub play: PlayRuntime,
    /// Graphics API passed to khamake (`-g`)
    #[serde(default = "default_gapi")]
    pub gapi: String,
    /// Build GLSL 1.10 shaders
    #[serde(default)]
    pub legacy_shaders: bool,
    /// Reuse the compiled script bundle when inputs are unchanged
    #[serde(default = "default_true")]
    pub cache_compiler: bool,
    /// Keep compiled shader variants between builds
    #[serde(default = "default_true")]
    pub cache_shaders: bool,
    /// Port for the local file server used by browser play
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pass `--nosound` to Krom (defaults to on for macOS)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nosound: Option<bool>,
}

fn default_gapi() -> String {
    "opengl".to_string()
}

fn default_port() -> u16 {
    8040
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            play: PlayRuntime::default(),
            gapi: default_gapi(),
            legacy_shaders: false,
            cache_compiler: true,
            cache_shaders: true,
            port: default_port(),
            nosound: None,
        }
    }
}

/// Publish settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Publish target (e.g. "html5", "krom-linux", "windows", "android-native")
    #[serde(default = "default_publish_target")]
    pub target: String,
    /// Minify the JS bundle for html5 and krom targets
    #[serde(default = "default_true")]
    pub minify: bool,
}

fn default_publish_target() -> String {
    "html5".to_string()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { target: default_publish_target(), minify: true }
    }
}

/// Snapshot of the host application's active scene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Active scene name
    #[serde(default = "default_scene_name")]
    pub name: String,
    /// Render resolution [width, height]
    #[serde(default = "default_resolution")]
    pub resolution: [u32; 2],
    /// World shader define string (e.g. "_SSAO_VR")
    #[serde(default)]
    pub shader_flags: String,
    /// Active camera clip planes [near, far]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_clip: Option<[f32; 2]>,
}

fn default_scene_name() -> String {
    "Scene".to_string()
}

fn default_resolution() -> [u32; 2] {
    [1280, 720]
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            name: default_scene_name(),
            resolution: default_resolution(),
            shader_flags: String::new(),
            camera_clip: None,
        }
    }
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default = "default_true")]
    pub clear_screen: bool,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100, clear_screen: true }
    }
}

/// Complete playmake.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaymakeConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    /// External tools
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Publish settings
    #[serde(default)]
    pub publish: PublishConfig,
    /// Active scene snapshot
    #[serde(default)]
    pub scene: SceneConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "scene.resolution")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "playmake.toml: '{}' {}", self.field, self.message)
    }
}

impl PlaymakeConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.project.package.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.package".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.runtime.gapi.is_empty() {
            errors.push(ConfigValidationError {
                field: "runtime.gapi".to_string(),
                message: "must name a graphics API".to_string(),
            });
        }

        if self.runtime.port == 0 {
            errors.push(ConfigValidationError {
                field: "runtime.port".to_string(),
                message: "must be a positive port number".to_string(),
            });
        }

        if self.publish.target.is_empty() {
            errors.push(ConfigValidationError {
                field: "publish.target".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.scene.resolution[0] == 0 || self.scene.resolution[1] == 0 {
            errors.push(ConfigValidationError {
                field: "scene.resolution".to_string(),
                message: "dimensions must be positive".to_string(),
            });
        }

        if let Some([near, far]) = self.scene.camera_clip {
            if !(near > 0.0 && far > near) {
                errors.push(ConfigValidationError {
                    field: "scene.camera_clip".to_string(),
                    message: "must satisfy 0 < near < far".to_string(),
                });
            }
        }

        if self.watch.debounce_ms == 0 {
            errors.push(ConfigValidationError {
                field: "watch.debounce_ms".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> PlaymakeConfig {
        toml::from_str("[project]\nname = \"demo\"").unwrap()
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = minimal();
        assert_eq!(config.project.package, "arm");
        assert_eq!(config.project.sources, PathBuf::from("Sources"));
        assert!(config.project.build_dir.is_none());
        assert_eq!(config.runtime.play, PlayRuntime::Krom);
        assert_eq!(config.runtime.gapi, "opengl");
        assert_eq!(config.runtime.port, 8040);
        assert!(config.runtime.cache_compiler);
        assert!(config.runtime.cache_shaders);
        assert_eq!(config.publish.target, "html5");
        assert_eq!(config.scene.resolution, [1280, 720]);
        assert_eq!(config.toolchain.node, PathBuf::from("node"));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_toolchain_default_matches_missing_section() {
        assert_eq!(ToolchainConfig::default().node, PathBuf::from("node"));
        let config: PlaymakeConfig = toml::from_str("[project]\nname = \"demo\"\n[runtime]\nport = 9000").unwrap();
        assert_eq!(config.toolchain.node, PathBuf::from("node"));
        assert!(config.toolchain.extra_args.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let config: PlaymakeConfig = toml::from_str(
            r#"
[project]
name = "tanks"
package = "tanks"

[toolchain]
sdk = "/opt/sdk"
ffmpeg = "/usr/bin/ffmpeg"
extra_args = ["--debug", "--verbose"]

[runtime]
play = "browser"
gapi = "direct3d11"
legacy_shaders = true
cache_compiler = false
port = 9000

[publish]
target = "krom-linux"
minify = false

[scene]
name = "Level1"
resolution = [1920, 1080]
shader_flags = "_SSAO_VR"
camera_clip = [0.1, 250.0]
"#,
        )
        .unwrap();

        assert_eq!(config.runtime.play, PlayRuntime::Browser);
        assert_eq!(config.runtime.gapi, "direct3d11");
        assert!(!config.runtime.cache_compiler);
        assert_eq!(config.toolchain.extra_args, vec!["--debug", "--verbose"]);
        assert_eq!(config.publish.target, "krom-linux");
        assert_eq!(config.scene.camera_clip, Some([0.1, 250.0]));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_reports_field_paths() {
        let mut config = minimal();
        config.project.name = String::new();
        config.scene.resolution = [0, 720];
        config.scene.camera_clip = Some([10.0, 1.0]);

        let errors = config.validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"project.name"));
        assert!(fields.contains(&"scene.resolution"));
        assert!(fields.contains(&"scene.camera_clip"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ConfigValidationError {
            field: "runtime.port".to_string(),
            message: "must be a positive port number".to_string(),
        };
        assert_eq!(err.to_string(), "playmake.toml: 'runtime.port' must be a positive port number");
    }

    #[test]
    fn test_play_runtime_from_str() {
        assert_eq!("krom".parse::<PlayRuntime>(), Ok(PlayRuntime::Krom));
        assert_eq!("Browser".parse::<PlayRuntime>(), Ok(PlayRuntime::Browser));
        assert_eq!("html5".parse::<PlayRuntime>(), Ok(PlayRuntime::Browser));
        assert_eq!("native".parse::<PlayRuntime>(), Ok(PlayRuntime::Native));
        assert!("vulkan".parse::<PlayRuntime>().is_err());
    }
}
