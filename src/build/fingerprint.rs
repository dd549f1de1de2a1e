//! Snapshot of the inputs that decide whether the compiled bundle is stale.
//!
//! Fields are compared one by one; each difference drives its own follow-up
//! (config rewrite, shader invalidation, recompile).

use crate::build::export::SceneSnapshot;
use crate::build::TargetDescriptor;
use crate::config::SceneConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

/// Camera clip planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlanes {
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
}

impl From<[f32; 2]> for ClipPlanes {
    fn from([near, far]: [f32; 2]) -> Self {
        Self { near, far }
    }
}

/// Output resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl From<[u32; 2]> for Resolution {
    fn from([width, height]: [u32; 2]) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Inputs of one build invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildInputFingerprint {
    /// World shader defines (`_SSAO_VR` -> `{"_SSAO", "_VR"}`)
    pub shader_flags: BTreeSet<String>,
    /// Clip planes of the active camera, if the scene has one
    pub camera_clip: Option<ClipPlanes>,
    /// Target being built
    pub target: TargetDescriptor,
    /// Whether the build runs in the host's viewport
    pub viewport: bool,
    /// Whether the build compiles into the publish output
    pub publish: bool,
    /// Output resolution
    pub resolution: Resolution,
    /// Active scene name
    pub scene: String,
    /// Script sources and their modification times
    pub script_mtimes: BTreeMap<String, SystemTime>,
}

impl BuildInputFingerprint {
    /// Fingerprint an exported scene for a target.
    pub fn from_snapshot(snapshot: &SceneSnapshot, target: TargetDescriptor, viewport: bool) -> Self {
        Self {
            shader_flags: parse_shader_flags(&snapshot.shader_flags),
            camera_clip: snapshot.camera_clip,
            target,
            viewport,
            publish: false,
            resolution: snapshot.resolution,
            scene: snapshot.scene.clone(),
            script_mtimes: BTreeMap::new(),
        }
    }

    /// Fingerprint the `[scene]` section of the config.
    pub fn from_scene(scene: &SceneConfig, target: TargetDescriptor, viewport: bool) -> Self {
        Self::from_snapshot(&SceneSnapshot::from(scene), target, viewport)
    }

    /// Attach the script modification times.
    pub fn with_scripts(mut self, script_mtimes: BTreeMap<String, SystemTime>) -> Self {
        self.script_mtimes = script_mtimes;
        self
    }

    /// Mark the fingerprint as a publish build.
    pub fn with_publish(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    /// Whether the shader variant inputs (defines and clip planes) differ.
    pub fn shaders_differ(&self, other: &Self) -> bool {
        self.shader_flags != other.shader_flags || self.camera_clip != other.camera_clip
    }

    /// Whether the VR define is set.
    pub fn has_vr(&self) -> bool {
        self.shader_flags.contains("_VR")
    }
}

/// Split a define string into its flags.
///
/// Each flag starts with `_`; `_SSAO_VR` yields `_SSAO` and `_VR`.
pub fn parse_shader_flags(defines: &str) -> BTreeSet<String> {
    defines
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| format!("_{}", part))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(flags: &str) -> SceneConfig {
        SceneConfig { shader_flags: flags.to_string(), ..Default::default() }
    }

    #[test]
    fn test_parse_shader_flags() {
        let flags = parse_shader_flags("_SSAO_VR");
        assert_eq!(flags.len(), 2);
        assert!(flags.contains("_SSAO"));
        assert!(flags.contains("_VR"));
    }

    #[test]
    fn test_parse_shader_flags_empty() {
        assert!(parse_shader_flags("").is_empty());
        assert!(parse_shader_flags("__").is_empty());
    }

    #[test]
    fn test_shader_flag_order_is_irrelevant() {
        assert_eq!(parse_shader_flags("_VR_SSAO"), parse_shader_flags("_SSAO_VR"));
    }

    #[test]
    fn test_from_scene() {
        let mut config = scene("_SSAO");
        config.camera_clip = Some([0.1, 100.0]);
        let fp = BuildInputFingerprint::from_scene(&config, TargetDescriptor::krom(), true);

        assert_eq!(fp.scene, "Scene");
        assert_eq!(fp.resolution, Resolution { width: 1280, height: 720 });
        assert_eq!(fp.camera_clip, Some(ClipPlanes { near: 0.1, far: 100.0 }));
        assert!(fp.viewport);
        assert!(!fp.has_vr());
    }

    #[test]
    fn test_shaders_differ() {
        let a = BuildInputFingerprint::from_scene(&scene("_SSAO"), TargetDescriptor::krom(), false);
        let b = BuildInputFingerprint::from_scene(&scene("_SSAO_VR"), TargetDescriptor::krom(), false);
        assert!(a.shaders_differ(&b));
        assert!(b.has_vr());

        let mut c = a.clone();
        c.camera_clip = Some(ClipPlanes { near: 1.0, far: 2.0 });
        assert!(a.shaders_differ(&c));
        assert!(!a.shaders_differ(&a.clone()));
    }

    #[test]
    fn test_resolution_display() {
        assert_eq!(Resolution { width: 800, height: 600 }.to_string(), "800x600");
    }
}
