//! Build context containing configuration and resolved paths for a project.

use crate::build::TargetDescriptor;
use crate::config::PlaymakeConfig;
use std::path::{Path, PathBuf};

/// Name of the marker written when the viewport runtime is ready.
pub const LOCK_FILENAME: &str = "krom.lock";

/// Name of the compiled shader manifest.
pub const SHADER_MANIFEST_FILENAME: &str = "shader_datas.arm";

/// Resource directories removed when shader caching is disabled.
const SHADER_RESOURCE_DIRS: &[&str] = &[
    "debug/html5-resources",
    "krom-resources",
    "debug/krom-resources",
    "windows-resources",
    "linux-resources",
    "osx-resources",
    "compiled/Shaders",
];

/// Build context containing configuration and paths for a project.
///
/// All paths handed to subprocesses are resolved against the project root.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: PlaymakeConfig,
    /// Project root directory (where playmake.toml is located)
    project_root: PathBuf,
}

impl BuildContext {
    /// Create a new build context.
    pub fn new(config: PlaymakeConfig, project_root: PathBuf) -> Self {
        Self { config, project_root }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PlaymakeConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve a path relative to the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Build directory relative to the project root (e.g. `build_my_game`).
    pub fn build_dir_name(&self) -> PathBuf {
        match &self.config.project.build_dir {
            Some(dir) => dir.clone(),
            None => PathBuf::from(format!("build_{}", safe_str(&self.config.project.name))),
        }
    }

    /// Absolute build directory.
    pub fn build_dir(&self) -> PathBuf {
        self.resolve_path(&self.build_dir_name())
    }

    /// Root of the script sources (`Sources`).
    pub fn sources_root(&self) -> PathBuf {
        self.resolve_path(&self.config.project.sources)
    }

    /// Directory holding the project's own scripts (`Sources/<package>`).
    pub fn script_dir(&self) -> PathBuf {
        self.sources_root().join(safe_str(&self.config.project.package).replace('.', "/"))
    }

    /// Directory of compiled shaders.
    pub fn shaders_dir(&self) -> PathBuf {
        self.build_dir().join("compiled").join("Shaders")
    }

    /// Compiled shader manifest.
    pub fn shader_manifest(&self) -> PathBuf {
        self.shaders_dir().join(SHADER_MANIFEST_FILENAME)
    }

    /// Directories cleared when shader caching is disabled.
    pub fn shader_resource_dirs(&self) -> Vec<PathBuf> {
        let build = self.build_dir();
        SHADER_RESOURCE_DIRS.iter().map(|d| build.join(d)).collect()
    }

    /// Output directory passed to khamake with `--to`.
    pub fn compile_output_dir(&self, target: &TargetDescriptor, in_viewport: bool, is_publish: bool) -> PathBuf {
        let kha = target.kha_target();
        let debug = (kha == "krom" && !in_viewport && !is_publish) || (kha == "html5" && !is_publish);
        if debug {
            self.build_dir().join("debug")
        } else {
            self.build_dir()
        }
    }

    /// Compiled script bundle for a play target.
    ///
    /// Native targets have no reusable bundle and return `None`.
    pub fn script_bundle(&self, target: &TargetDescriptor, in_viewport: bool) -> Option<PathBuf> {
        use crate::build::RuntimeKind;

        let build = self.build_dir();
        if in_viewport {
            return Some(build.join("krom").join("krom.js"));
        }
        match target.kind() {
            RuntimeKind::Embedded => Some(build.join("debug").join("krom").join("krom.js")),
            RuntimeKind::Browser => Some(build.join("debug").join("html5").join("kha.js")),
            RuntimeKind::Native => None,
        }
    }

    /// Compiled script bundle for a publish target.
    pub fn publish_bundle(&self, target: &TargetDescriptor) -> Option<PathBuf> {
        match target.kha_target() {
            "html5" => Some(self.publish_dir(target).join("kha.js")),
            "krom" => Some(self.publish_dir(target).join("krom.js")),
            _ => None,
        }
    }

    /// Directory khamake writes a published target to.
    pub fn publish_dir(&self, target: &TargetDescriptor) -> PathBuf {
        self.build_dir().join(target.kha_target())
    }

    /// Marker written when the viewport runtime is ready.
    pub fn lock_file(&self) -> PathBuf {
        self.build_dir().join("krom").join(LOCK_FILENAME)
    }

    /// File Krom redirects its stdout to.
    pub fn krom_stdout(&self) -> PathBuf {
        self.build_dir().join("krom.txt")
    }

    /// Companion configuration file read by the runtime.
    pub fn config_file(&self) -> PathBuf {
        self.project_root.join("Bundled").join("config.arm")
    }

    /// khamake entry script.
    pub fn khamake_path(&self) -> PathBuf {
        match &self.config.toolchain.khamake {
            Some(path) => self.resolve_path(path),
            None => self.sdk_path().join("Kha").join("make"),
        }
    }

    /// JS minifier script.
    pub fn minifier_path(&self) -> PathBuf {
        match &self.config.toolchain.minifier {
            Some(path) => self.resolve_path(path),
            None => self
                .sdk_path()
                .join("lib")
                .join("armory_tools")
                .join("uglifyjs")
                .join("bin")
                .join("uglifyjs"),
        }
    }

    /// Krom binary for the configured graphics API.
    pub fn krom_path(&self) -> PathBuf {
        if let Some(path) = &self.config.toolchain.krom {
            return self.resolve_path(path);
        }

        let gapi = &self.config.runtime.gapi;
        let ext = if gapi == "opengl" { String::new() } else { format!("_{}", gapi) };
        let krom = self.sdk_path().join("Krom");
        if cfg!(target_os = "windows") {
            krom.join("win32").join(format!("Krom{}.exe", ext))
        } else if cfg!(target_os = "macos") {
            krom.join("macos").join("Krom.app").join("Contents").join("MacOS").join(format!("Krom{}", ext))
        } else {
            krom.join("linux").join(format!("Krom{}", ext))
        }
    }

    /// SDK root resolved against the project.
    pub fn sdk_path(&self) -> PathBuf {
        self.resolve_path(&self.config.toolchain.sdk)
    }

    /// Whether Krom should be started without sound.
    pub fn krom_nosound(&self) -> bool {
        self.config.runtime.nosound.unwrap_or(cfg!(target_os = "macos"))
    }
}

/// Make a name safe for use in paths and identifiers.
///
/// Every character outside `[A-Za-z0-9_]` (and `.` when it separates package
/// segments) becomes `_`.
pub fn safe_str(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
        .collect()
}
