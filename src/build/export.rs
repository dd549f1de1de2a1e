//! Scene export collaborator.
//!
//! The host application owns the scene model; the build layer only needs a
//! snapshot of the inputs that affect compilation and a way to write the
//! companion config. [`ProjectExporter`] serves standalone projects by
//! reading the `[scene]` section of `playmake.toml`.

use crate::build::fingerprint::{parse_shader_flags, ClipPlanes, Resolution};
use crate::build::{BuildContext, TargetDescriptor};
use crate::config::{load_config, SceneConfig};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Scene export error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExportError {
    /// File I/O error
    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),
    /// Config serialization error
    #[error("Failed to write config: {0}")]
    Json(#[from] serde_json::Error),
    /// Error reported by a host exporter
    #[error("Export failed: {0}")]
    Exporter(String),
}

/// What is being exported.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Target being built
    pub target: TargetDescriptor,
    /// Export for play
    pub is_play: bool,
    /// Export for publish
    pub is_publish: bool,
    /// Export for the host's viewport
    pub in_viewport: bool,
}

/// Build inputs taken from the exported scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSnapshot {
    /// Active scene name
    pub scene: String,
    /// Render resolution
    pub resolution: Resolution,
    /// World shader define string
    pub shader_flags: String,
    /// Clip planes of the active camera
    pub camera_clip: Option<ClipPlanes>,
}

impl From<&SceneConfig> for SceneSnapshot {
    fn from(scene: &SceneConfig) -> Self {
        Self {
            scene: scene.name.clone(),
            resolution: scene.resolution.into(),
            shader_flags: scene.shader_flags.clone(),
            camera_clip: scene.camera_clip.map(ClipPlanes::from),
        }
    }
}

/// Exports scene data for a build.
pub trait SceneExporter: Send + Sync {
    /// Export scene data and return the build-relevant snapshot.
    fn export(&self, request: &ExportRequest) -> Result<SceneSnapshot, ExportError>;

    /// Write the companion configuration file read by the runtime.
    fn write_config(&self, snapshot: &SceneSnapshot) -> Result<(), ExportError>;

    /// Write the compiled shader manifest for the snapshot's world defines.
    fn write_shader_manifest(&self, snapshot: &SceneSnapshot) -> Result<(), ExportError>;

    /// Refresh the trait metadata of one modified script.
    fn refresh_script_props(&self, _script: &Path) {}

    /// Refresh the global trait metadata after scripts changed.
    fn refresh_trait_props(&self) {}

    /// Drop cached material signatures so they are regenerated.
    fn invalidate_material_cache(&self) {}
}

#[derive(Serialize)]
struct RuntimeConfigFile<'a> {
    scene: &'a str,
    window_w: u32,
    window_h: u32,
}

#[derive(Serialize)]
struct ShaderManifest<'a> {
    defines: Vec<String>,
    shader_datas: &'a [serde_json::Value],
}

/// Exporter for standalone projects driven by `playmake.toml`.
#[derive(Debug, Clone)]
pub struct ProjectExporter {
    context: BuildContext,
    scene_file: Option<PathBuf>,
}

impl ProjectExporter {
    /// Create an exporter for a project.
    pub fn new(context: BuildContext) -> Self {
        Self { context, scene_file: None }
    }

    /// Re-read the `[scene]` section from `path` on every export.
    ///
    /// Without it the scene loaded with the build context is used.
    pub fn with_scene_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.scene_file = Some(path.into());
        self
    }

    fn scene(&self) -> Result<SceneConfig, ExportError> {
        match &self.scene_file {
            Some(path) => load_config(Some(path))
                .map(|config| config.scene)
                .map_err(|e| ExportError::Exporter(e.to_string())),
            None => Ok(self.context.config().scene.clone()),
        }
    }
}

impl SceneExporter for ProjectExporter {
    fn export(&self, request: &ExportRequest) -> Result<SceneSnapshot, ExportError> {
        fs::create_dir_all(self.context.script_dir())?;

        let scene = self.scene()?;
        tracing::debug!(
            scene = %scene.name,
            target = %request.target,
            play = request.is_play,
            publish = request.is_publish,
            "exporting scene snapshot"
        );

        Ok(SceneSnapshot::from(&scene))
    }

    fn write_config(&self, snapshot: &SceneSnapshot) -> Result<(), ExportError> {
        if !self.context.config().project.write_config {
            return Ok(());
        }

        let path = self.context.config_file();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = RuntimeConfigFile {
            scene: &snapshot.scene,
            window_w: snapshot.resolution.width,
            window_h: snapshot.resolution.height,
        };
        fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        tracing::debug!(path = %path.display(), "wrote runtime config");
        Ok(())
    }

    fn write_shader_manifest(&self, snapshot: &SceneSnapshot) -> Result<(), ExportError> {
        let path = self.context.shader_manifest();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let manifest = ShaderManifest {
            defines: parse_shader_flags(&snapshot.shader_flags).into_iter().collect(),
            shader_datas: &[],
        };
        fs::write(&path, serde_json::to_string(&manifest)?)?;
        tracing::debug!(path = %path.display(), "wrote shader manifest");
        Ok(())
    }

    fn refresh_script_props(&self, script: &Path) {
        tracing::debug!(script = %script.display(), "script changed");
    }
}
