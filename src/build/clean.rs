//! Removal of build output and generated project files.

use crate::build::BuildContext;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Clean error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CleanError {
    /// A path could not be removed
    #[error("Failed to remove {path}: {source}")]
    Remove {
        /// Path being removed
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
}

/// Generated files written next to the project by the build tool.
const GENERATED_FILES: &[&str] = &["khafile.js", "korefile.js"];

/// Paths removed by a clean.
#[derive(Debug, Default, Clone)]
pub struct CleanReport {
    /// Every removed file or directory
    pub removed: Vec<PathBuf>,
}

impl std::fmt::Display for CleanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Project cleaned ({} paths removed)", self.removed.len())
    }
}

/// Remove build output, compiled nodes and generated project files.
///
/// The package and `Sources` directories are removed only when empty.
pub fn clean_project(ctx: &BuildContext) -> Result<CleanReport, CleanError> {
    let mut report = CleanReport::default();
    let root = ctx.project_root();

    remove_dir(&ctx.build_dir(), &mut report)?;
    remove_dir(&root.join("build"), &mut report)?;

    let script_dir = ctx.script_dir();
    remove_dir(&script_dir.join("node"), &mut report)?;

    for name in GENERATED_FILES {
        remove_file(&root.join(name), &mut report)?;
    }
    let sources = ctx.sources_root();
    remove_file(&sources.join("Main.hx"), &mut report)?;

    if is_empty_dir(&script_dir) {
        remove_dir(&script_dir, &mut report)?;
        if is_empty_dir(&sources) {
            remove_dir(&sources, &mut report)?;
        }
    }

    tracing::info!(removed = report.removed.len(), "project cleaned");
    Ok(report)
}

/// Remove compiled shader resources so they are rebuilt.
pub fn clear_shader_cache(ctx: &BuildContext) -> Result<CleanReport, CleanError> {
    let mut report = CleanReport::default();
    for dir in ctx.shader_resource_dirs() {
        remove_dir(&dir, &mut report)?;
    }
    Ok(report)
}

/// Remove compiled shader variants after the camera clip planes changed.
pub fn invalidate_shaders(ctx: &BuildContext) -> Result<bool, CleanError> {
    let mut report = CleanReport::default();
    remove_dir(&ctx.shaders_dir(), &mut report)?;
    Ok(!report.removed.is_empty())
}

fn remove_dir(path: &Path, report: &mut CleanReport) -> Result<(), CleanError> {
    if !path.is_dir() {
        return Ok(());
    }
    if let Err(source) = fs::remove_dir_all(path) {
        // Read-only files block removal on some platforms; retry once writable.
        make_writable(path);
        fs::remove_dir_all(path).map_err(|_| CleanError::Remove { path: path.to_path_buf(), source })?;
    }
    report.removed.push(path.to_path_buf());
    Ok(())
}

fn remove_file(path: &Path, report: &mut CleanReport) -> Result<(), CleanError> {
    if !path.is_file() {
        return Ok(());
    }
    fs::remove_file(path).map_err(|source| CleanError::Remove { path: path.to_path_buf(), source })?;
    report.removed.push(path.to_path_buf());
    Ok(())
}

fn make_writable(dir: &Path) {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let Ok(entries) = glob::glob(&pattern) else {
        return;
    };
    for path in entries.flatten() {
        if let Ok(metadata) = fs::metadata(&path) {
            let mut permissions = metadata.permissions();
            if permissions.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                permissions.set_readonly(false);
                let _ = fs::set_permissions(&path, permissions);
            }
        }
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).map(|mut entries| entries.next().is_none()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();
        path
    }

    fn ctx(temp: &TempDir) -> BuildContext {
        let mut config = default_config();
        config.project.name = "game".to_string();
        BuildContext::new(config, temp.path().to_path_buf())
    }

    #[test]
    fn test_clean_removes_build_output() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        create_test_file(root, "build_game/debug/krom/krom.js");
        create_test_file(root, "build/old.txt");
        create_test_file(root, "Sources/arm/node/Tree.hx");
        create_test_file(root, "khafile.js");
        create_test_file(root, "korefile.js");
        create_test_file(root, "Sources/Main.hx");

        let report = clean_project(&ctx(&temp)).unwrap();

        assert!(!root.join("build_game").exists());
        assert!(!root.join("build").exists());
        assert!(!root.join("khafile.js").exists());
        assert!(!root.join("korefile.js").exists());
        // Package and Sources dirs were left empty and are removed too
        assert!(!root.join("Sources").exists());
        assert_eq!(report.removed.len(), 8);
    }

    #[test]
    fn test_clean_keeps_user_scripts() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        create_test_file(root, "Sources/arm/MyTrait.hx");
        create_test_file(root, "Sources/Main.hx");

        clean_project(&ctx(&temp)).unwrap();

        assert!(root.join("Sources/arm/MyTrait.hx").exists());
        assert!(!root.join("Sources/Main.hx").exists());
    }

    #[test]
    fn test_clean_empty_project() {
        let temp = TempDir::new().unwrap();
        let report = clean_project(&ctx(&temp)).unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.to_string(), "Project cleaned (0 paths removed)");
    }

    #[test]
    fn test_clear_shader_cache() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        create_test_file(root, "build_game/compiled/Shaders/shader_datas.arm");
        create_test_file(root, "build_game/debug/html5-resources/a.glsl");
        create_test_file(root, "build_game/debug/krom/krom.js");

        let report = clear_shader_cache(&ctx(&temp)).unwrap();
        assert_eq!(report.removed.len(), 2);
        assert!(root.join("build_game/debug/krom/krom.js").exists());
    }

    #[test]
    fn test_invalidate_shaders() {
        let temp = TempDir::new().unwrap();
        let ctx = ctx(&temp);
        assert!(!invalidate_shaders(&ctx).unwrap());

        create_test_file(temp.path(), "build_game/compiled/Shaders/deferred.glsl");
        assert!(invalidate_shaders(&ctx).unwrap());
        assert!(!temp.path().join("build_game/compiled/Shaders").exists());
    }
}
