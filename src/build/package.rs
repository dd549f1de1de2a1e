//! Publish packaging.
//!
//! Runs after a successful publish compile: minifies the JS bundle, removes
//! leftover source maps and reports where the build tool put the result.

use crate::build::command::minify_argv;
use crate::build::context::safe_str;
use crate::build::{BuildContext, TargetDescriptor};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

/// Packaging error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PackageError {
    /// File I/O error
    #[error("Packaging failed: {0}")]
    Io(#[from] std::io::Error),
    /// The minifier could not be started
    #[error("Failed to launch minifier {program}: {source}")]
    Launch {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// The minifier exited unsuccessfully
    #[error("Minifier failed with {}", .code.map_or("a signal".to_string(), |c| format!("exit code {}", c)))]
    Minify {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
    },
}

/// Kind of artifact the build tool produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Browser package
    Html5,
    /// Xcode project
    Xcode,
    /// Visual Studio project
    VisualStudio,
    /// Android Studio project
    AndroidStudio,
    /// Krom package
    Krom,
    /// Makefiles for any other platform
    Makefiles,
}

impl ExportKind {
    /// Kind produced for a khamake target.
    pub fn for_target(kha_target: &str) -> Self {
        match kha_target {
            "html5" => ExportKind::Html5,
            "ios" | "osx" => ExportKind::Xcode,
            "windows" | "windowsapp" => ExportKind::VisualStudio,
            "android-native" => ExportKind::AndroidStudio,
            "krom" => ExportKind::Krom,
            _ => ExportKind::Makefiles,
        }
    }

    /// Human readable description.
    pub fn description(&self) -> &'static str {
        match self {
            ExportKind::Html5 => "HTML5 package",
            ExportKind::Xcode => "XCode project",
            ExportKind::VisualStudio => "Visual Studio 2017 project",
            ExportKind::AndroidStudio => "Android Studio project",
            ExportKind::Krom => "Krom package",
            ExportKind::Makefiles => "makefiles",
        }
    }
}

/// Where a published build ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Published target
    pub target: TargetDescriptor,
    /// Kind of artifact
    pub kind: ExportKind,
    /// Output location
    pub location: PathBuf,
    /// Whether the JS bundle was minified
    pub minified: bool,
}

impl std::fmt::Display for PublishReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Exported {} to {}", self.kind.description(), self.location.display())
    }
}

/// Finishes a published build.
pub trait Packager: Send + Sync {
    /// Package the output of a successful publish compile.
    fn package(&self, target: &TargetDescriptor) -> Result<PublishReport, PackageError>;
}

/// Default packager: minify, clean up, report.
#[derive(Debug, Clone)]
pub struct StandardPackager {
    context: BuildContext,
}

impl StandardPackager {
    /// Create a packager for a project.
    pub fn new(context: BuildContext) -> Self {
        Self { context }
    }

    fn minify(&self, js_file: &std::path::Path) -> Result<(), PackageError> {
        let argv = minify_argv(&self.context, js_file);
        tracing::info!(file = %js_file.display(), "minifying bundle");

        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(self.context.project_root())
            .status()
            .map_err(|source| PackageError::Launch { program: argv[0].clone(), source })?;

        if status.success() {
            Ok(())
        } else {
            Err(PackageError::Minify { code: status.code() })
        }
    }

    fn location(&self, kind: ExportKind, files: PathBuf) -> PathBuf {
        let with_suffix = |suffix: &str| {
            let mut name = files.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };

        match kind {
            ExportKind::Html5 | ExportKind::Krom => files,
            ExportKind::AndroidStudio => {
                with_suffix("-build").join(safe_str(&self.context.config().project.name))
            }
            ExportKind::Xcode | ExportKind::VisualStudio | ExportKind::Makefiles => with_suffix("-build"),
        }
    }
}

impl Packager for StandardPackager {
    fn package(&self, target: &TargetDescriptor) -> Result<PublishReport, PackageError> {
        let kha_target = target.kha_target();
        let files = self.context.publish_dir(target);
        let kind = ExportKind::for_target(kha_target);

        let mut minified = false;
        if self.context.config().publish.minify {
            if let Some(bundle) = self.context.publish_bundle(target) {
                self.minify(&bundle)?;
                minified = true;
            }
        }

        if kind == ExportKind::Krom {
            let map = files.join("krom.js.temp.map");
            if map.exists() {
                fs::remove_file(&map)?;
            }
        }

        Ok(PublishReport { target: target.clone(), kind, location: self.location(kind, files), minified })
    }
}
