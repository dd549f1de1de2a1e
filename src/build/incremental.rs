//! Incremental build support.
//!
//! Decides whether a full recompile is needed or the cached script bundle
//! can be reused.
//!
//! # How It Works
//!
//! The [`ChangeTracker`] remembers the last-seen value of every build input.
//! Each invocation:
//!
//! 1. Observes the active scene and resolution (a change rewrites the
//!    companion config and forces a recompile)
//! 2. Observes the camera clip planes (a change drops compiled shaders)
//! 3. Scans the script sources for files newer than the watermark
//! 4. Asks [`should_recompile`] whether the fingerprint, target or cache
//!    state requires a compile
//!
//! # Example
//!
//! ```ignore
//! use playmake::build::incremental::should_recompile;
//!
//! let stale = should_recompile(&current, tracker.previous(), &target,
//!     last_target.as_ref(), bundle.exists(), config.runtime.cache_compiler);
//! ```

use crate::build::fingerprint::{BuildInputFingerprint, ClipPlanes, Resolution};
use crate::build::{RuntimeKind, TargetDescriptor};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Why a recompile is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecompileReason {
    /// Nothing was built yet
    FirstBuild,
    /// Compiler caching is disabled
    CachingDisabled,
    /// The compiled bundle or shader manifest is missing
    ArtifactMissing,
    /// Shader defines or camera clip planes changed
    ShadersChanged,
    /// A different target or output (debug or publish) was built last
    TargetChanged,
    /// Viewport mode toggled
    ViewportChanged,
    /// Native targets are never cached
    NativeTarget,
}

impl std::fmt::Display for RecompileReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RecompileReason::FirstBuild => "first build",
            RecompileReason::CachingDisabled => "compiler cache disabled",
            RecompileReason::ArtifactMissing => "cached artifact missing",
            RecompileReason::ShadersChanged => "shader inputs changed",
            RecompileReason::TargetChanged => "target changed",
            RecompileReason::ViewportChanged => "viewport mode changed",
            RecompileReason::NativeTarget => "native target",
        };
        write!(f, "{}", text)
    }
}

/// First rule that requires a recompile, if any.
pub fn recompile_reason(
    current: &BuildInputFingerprint,
    previous: Option<&BuildInputFingerprint>,
    target: &TargetDescriptor,
    previous_target: Option<&TargetDescriptor>,
    cached_artifact_exists: bool,
    caching_enabled: bool,
) -> Option<RecompileReason> {
    let Some(previous) = previous else {
        return Some(RecompileReason::FirstBuild);
    };

    if !caching_enabled {
        Some(RecompileReason::CachingDisabled)
    } else if !cached_artifact_exists {
        Some(RecompileReason::ArtifactMissing)
    } else if current.shaders_differ(previous) {
        Some(RecompileReason::ShadersChanged)
    } else if previous_target != Some(target) || current.publish != previous.publish {
        Some(RecompileReason::TargetChanged)
    } else if current.viewport != previous.viewport {
        Some(RecompileReason::ViewportChanged)
    } else if target.kind() == RuntimeKind::Native {
        Some(RecompileReason::NativeTarget)
    } else {
        None
    }
}

/// Whether the inputs require a full recompile.
pub fn should_recompile(
    current: &BuildInputFingerprint,
    previous: Option<&BuildInputFingerprint>,
    target: &TargetDescriptor,
    previous_target: Option<&TargetDescriptor>,
    cached_artifact_exists: bool,
    caching_enabled: bool,
) -> bool {
    recompile_reason(current, previous, target, previous_target, cached_artifact_exists, caching_enabled)
        .is_some()
}

/// Result of observing the active scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneChange {
    /// The companion config must be rewritten and the entry point recompiled
    pub config_rewrite: bool,
}

/// Result of a script scan.
#[derive(Debug, Clone, Default)]
pub struct ScriptScan {
    /// Dotted module names of scripts newer than the watermark, in discovery order
    pub modified: Vec<String>,
    /// Every script seen with its modification time
    pub mtimes: BTreeMap<String, SystemTime>,
}

impl ScriptScan {
    /// Whether any script changed.
    pub fn any_modified(&self) -> bool {
        !self.modified.is_empty()
    }
}

/// Last-seen values of the build inputs.
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    last_scene: Option<String>,
    last_resolution: Option<Resolution>,
    last_clip: Option<ClipPlanes>,
    last_fingerprint: Option<BuildInputFingerprint>,
    script_watermark: SystemTime,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self {
            last_scene: None,
            last_resolution: None,
            last_clip: None,
            last_fingerprint: None,
            script_watermark: SystemTime::UNIX_EPOCH,
        }
    }
}

impl ChangeTracker {
    /// Create a tracker with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of the last build, if any.
    pub fn previous(&self) -> Option<&BuildInputFingerprint> {
        self.last_fingerprint.as_ref()
    }

    /// Record the fingerprint of the current build.
    pub fn record(&mut self, fingerprint: BuildInputFingerprint) {
        self.last_fingerprint = Some(fingerprint);
    }

    /// Newest script modification time seen so far.
    pub fn script_watermark(&self) -> SystemTime {
        self.script_watermark
    }

    /// Observe the active scene and resolution.
    ///
    /// The last-known values are updated whatever the outcome.
    pub fn observe_scene(&mut self, scene: &str, resolution: Resolution) -> SceneChange {
        let changed = self.last_scene.as_deref() != Some(scene)
            || self.last_resolution != Some(resolution);

        self.last_scene = Some(scene.to_string());
        self.last_resolution = Some(resolution);

        SceneChange { config_rewrite: changed }
    }

    /// Observe the active camera's clip planes.
    ///
    /// Returns true when compiled shader variants must be invalidated, which
    /// needs a previously recorded value that differs.
    pub fn observe_camera(&mut self, clip: Option<ClipPlanes>) -> bool {
        let Some(clip) = clip else {
            return false;
        };

        let invalidate = matches!(self.last_clip, Some(last) if last != clip);
        self.last_clip = Some(clip);
        invalidate
    }

    /// Scan `script_dir` for `.hx` files newer than the watermark.
    ///
    /// `on_modified` runs once per modified file. Module names are dotted
    /// paths relative to `sources_root` (`Sources/arm/MyTrait.hx` becomes
    /// `arm.MyTrait`). A missing directory yields an empty scan.
    pub fn scan_scripts<F>(&mut self, script_dir: &Path, sources_root: &Path, mut on_modified: F) -> ScriptScan
    where
        F: FnMut(&Path),
    {
        let mut scan = ScriptScan::default();
        if !script_dir.is_dir() {
            return scan;
        }

        let pattern = format!("{}/**/*.hx", glob::Pattern::escape(&script_dir.to_string_lossy()));
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "invalid script pattern");
                return scan;
            }
        };

        let mut newest = self.script_watermark;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable script entry");
                    continue;
                }
            };
            let mtime = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(mtime) => mtime,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read script mtime");
                    continue;
                }
            };

            let module = module_name(&path, sources_root);
            if mtime > self.script_watermark {
                on_modified(&path);
                scan.modified.push(module.clone());
            }
            if mtime > newest {
                newest = mtime;
            }
            scan.mtimes.insert(module, mtime);
        }

        self.script_watermark = newest;
        scan
    }

    /// Forget every recorded value.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Dotted module name of a script relative to the sources root.
pub fn module_name(path: &Path, sources_root: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(sources_root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneConfig;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fingerprint(flags: &str, target: TargetDescriptor) -> BuildInputFingerprint {
        let scene = SceneConfig { shader_flags: flags.to_string(), ..Default::default() };
        BuildInputFingerprint::from_scene(&scene, target, false)
    }

    fn create_test_file(dir: &Path, name: &str, mtime: SystemTime) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, "class T {}").unwrap();
        fs::File::options().write(true).open(&path).unwrap().set_modified(mtime).unwrap();
        path
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_first_build_recompiles() {
        let target = TargetDescriptor::html5();
        let fp = fingerprint("", target.clone());
        assert_eq!(
            recompile_reason(&fp, None, &target, None, true, true),
            Some(RecompileReason::FirstBuild)
        );
    }

    #[test]
    fn test_shader_flag_change_recompiles() {
        let target = TargetDescriptor::krom();
        for (old, new) in [("", "_SSAO"), ("_SSAO", "_SSAO_VR"), ("_VR", ""), ("_A_B", "_A_C")] {
            let previous = fingerprint(old, target.clone());
            let current = fingerprint(new, target.clone());
            assert!(
                should_recompile(&current, Some(&previous), &target, Some(&target), true, true),
                "{} -> {}",
                old,
                new
            );
        }
    }

    #[test]
    fn test_unchanged_inputs_reuse_artifact() {
        for target in [TargetDescriptor::krom(), TargetDescriptor::html5(), TargetDescriptor::new("krom-linux")] {
            let fp = fingerprint("_SSAO", target.clone());
            assert!(!should_recompile(&fp, Some(&fp.clone()), &target, Some(&target), true, true));
        }
    }

    #[test]
    fn test_native_target_always_recompiles() {
        let target = TargetDescriptor::native();
        let fp = fingerprint("_SSAO", target.clone());
        for _ in 0..3 {
            assert_eq!(
                recompile_reason(&fp, Some(&fp), &target, Some(&target), true, true),
                Some(RecompileReason::NativeTarget)
            );
        }
    }

    #[test]
    fn test_caching_disabled_recompiles() {
        let target = TargetDescriptor::krom();
        let fp = fingerprint("", target.clone());
        assert_eq!(
            recompile_reason(&fp, Some(&fp), &target, Some(&target), true, false),
            Some(RecompileReason::CachingDisabled)
        );
    }

    #[test]
    fn test_missing_artifact_recompiles() {
        let target = TargetDescriptor::krom();
        let fp = fingerprint("", target.clone());
        assert_eq!(
            recompile_reason(&fp, Some(&fp), &target, Some(&target), false, true),
            Some(RecompileReason::ArtifactMissing)
        );
    }

    #[test]
    fn test_target_change_recompiles() {
        let krom = TargetDescriptor::krom();
        let html5 = TargetDescriptor::html5();
        let fp = fingerprint("", html5.clone());
        assert_eq!(
            recompile_reason(&fp, Some(&fp), &html5, Some(&krom), true, true),
            Some(RecompileReason::TargetChanged)
        );
        assert_eq!(
            recompile_reason(&fp, Some(&fp), &html5, None, true, true),
            Some(RecompileReason::TargetChanged)
        );
    }

    #[test]
    fn test_publish_output_change_recompiles() {
        let html5 = TargetDescriptor::html5();
        let published = fingerprint("", html5.clone()).with_publish(true);
        let debug = fingerprint("", html5.clone());

        assert_eq!(
            recompile_reason(&debug, Some(&published), &html5, Some(&html5), true, true),
            Some(RecompileReason::TargetChanged)
        );
        assert_eq!(recompile_reason(&published, Some(&published), &html5, Some(&html5), true, true), None);
    }

    #[test]
    fn test_viewport_change_recompiles() {
        let target = TargetDescriptor::krom();
        let previous = fingerprint("", target.clone());
        let mut current = previous.clone();
        current.viewport = true;
        assert_eq!(
            recompile_reason(&current, Some(&previous), &target, Some(&target), true, true),
            Some(RecompileReason::ViewportChanged)
        );
    }

    #[test]
    fn test_camera_clip_change_recompiles() {
        let target = TargetDescriptor::krom();
        let previous = fingerprint("", target.clone());
        let mut current = previous.clone();
        current.camera_clip = Some(ClipPlanes { near: 0.1, far: 50.0 });
        assert_eq!(
            recompile_reason(&current, Some(&previous), &target, Some(&target), true, true),
            Some(RecompileReason::ShadersChanged)
        );
    }

    #[test]
    fn test_observe_scene() {
        let mut tracker = ChangeTracker::new();
        let hd = Resolution { width: 1280, height: 720 };

        assert!(tracker.observe_scene("Scene", hd).config_rewrite);
        assert!(!tracker.observe_scene("Scene", hd).config_rewrite);
        assert!(tracker.observe_scene("Level2", hd).config_rewrite);
        assert!(tracker.observe_scene("Level2", Resolution { width: 800, height: 600 }).config_rewrite);
        assert!(!tracker.observe_scene("Level2", Resolution { width: 800, height: 600 }).config_rewrite);
    }

    #[test]
    fn test_observe_camera() {
        let mut tracker = ChangeTracker::new();
        let near = ClipPlanes { near: 0.1, far: 100.0 };
        let far = ClipPlanes { near: 0.1, far: 500.0 };

        assert!(!tracker.observe_camera(Some(near)), "first observation only records");
        assert!(!tracker.observe_camera(Some(near)));
        assert!(tracker.observe_camera(Some(far)));
        assert!(!tracker.observe_camera(None));
        assert!(!tracker.observe_camera(Some(far)));
    }

    #[test]
    fn test_scan_scripts_missing_dir() {
        let temp = TempDir::new().unwrap();
        let mut tracker = ChangeTracker::new();
        let scan = tracker.scan_scripts(&temp.path().join("Sources/arm"), &temp.path().join("Sources"), |_| {
            panic!("no scripts expected")
        });
        assert!(!scan.any_modified());
        assert_eq!(tracker.script_watermark(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_scan_scripts_modified_names() {
        let temp = TempDir::new().unwrap();
        let sources = temp.path().join("Sources");
        create_test_file(&sources, "arm/MyTrait.hx", at(1_000));
        create_test_file(&sources, "arm/ui/Hud.hx", at(2_000));
        create_test_file(&sources, "arm/notes.txt", at(3_000));

        let mut tracker = ChangeTracker::new();
        let mut refreshed = Vec::new();
        let scan = tracker.scan_scripts(&sources.join("arm"), &sources, |p| refreshed.push(p.to_path_buf()));

        let mut modified = scan.modified.clone();
        modified.sort();
        assert_eq!(modified, vec!["arm.MyTrait".to_string(), "arm.ui.Hud".to_string()]);
        assert_eq!(refreshed.len(), 2);
        assert_eq!(scan.mtimes.len(), 2);
        assert_eq!(tracker.script_watermark(), at(2_000));
    }

    #[test]
    fn test_scan_scripts_watermark_advances() {
        let temp = TempDir::new().unwrap();
        let sources = temp.path().join("Sources");
        let script = create_test_file(&sources, "arm/MyTrait.hx", at(1_000));

        let mut tracker = ChangeTracker::new();
        assert!(tracker.scan_scripts(&sources.join("arm"), &sources, |_| {}).any_modified());

        // Unchanged file is not reported again
        assert!(!tracker.scan_scripts(&sources.join("arm"), &sources, |_| {}).any_modified());

        // Touching it reports it once more
        fs::File::options().write(true).open(&script).unwrap().set_modified(at(5_000)).unwrap();
        let scan = tracker.scan_scripts(&sources.join("arm"), &sources, |_| {});
        assert_eq!(scan.modified, vec!["arm.MyTrait".to_string()]);
        assert_eq!(tracker.script_watermark(), at(5_000));

        // An older file never moves the watermark back
        create_test_file(&sources, "arm/Old.hx", at(10));
        let scan = tracker.scan_scripts(&sources.join("arm"), &sources, |_| {});
        assert!(!scan.any_modified());
        assert_eq!(tracker.script_watermark(), at(5_000));
    }

    #[test]
    fn test_reset() {
        let mut tracker = ChangeTracker::new();
        let target = TargetDescriptor::krom();
        tracker.observe_scene("Scene", Resolution { width: 1, height: 1 });
        tracker.observe_camera(Some(ClipPlanes { near: 0.1, far: 1.0 }));
        tracker.record(fingerprint("", target));

        tracker.reset();
        assert!(tracker.previous().is_none());
        assert_eq!(tracker.script_watermark(), SystemTime::UNIX_EPOCH);
        assert!(tracker.observe_scene("Scene", Resolution { width: 1, height: 1 }).config_rewrite);
        assert!(!tracker.observe_camera(Some(ClipPlanes { near: 0.5, far: 2.0 })));
    }

    #[test]
    fn test_module_name() {
        let root = Path::new("/p/Sources");
        assert_eq!(module_name(Path::new("/p/Sources/arm/MyTrait.hx"), root), "arm.MyTrait");
        assert_eq!(module_name(Path::new("/p/Sources/arm/a/B.hx"), root), "arm.a.B");
    }
}
