//! Watch mode for automatic rebuilds on file changes
//!
//! Provides file system watching with debouncing for the `playmake watch`
//! command. Each relevant change runs a build; the change tracker decides
//! whether that means a full compile or reusing the cached bundle.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::build::log::LogEvent;
use crate::build::{BuildError, BuildOptions, Orchestrator};
use crate::config::loader::CONFIG_FILENAME;
use crate::config::schema::WatchConfig;

/// Error during watch mode
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch {path}: {source}")]
    WatchPath {
        /// Path that could not be watched
        path: PathBuf,
        /// Underlying watcher error
        #[source]
        source: notify::Error,
    },
    /// Source directory not found
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// The watcher stopped delivering events
    #[error("Watch channel closed")]
    ChannelClosed,
}

/// Options for watch mode
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Script sources directory to watch
    pub sources: PathBuf,
    /// Project config file to watch, if any
    pub config_file: Option<PathBuf>,
    /// Watch configuration (debounce, clear screen)
    pub config: WatchConfig,
}

impl WatchOptions {
    /// Watch the sources and config file of the orchestrator's project.
    pub fn for_project(orchestrator: &Orchestrator) -> Self {
        let context = orchestrator.context();
        let config_file = context.project_root().join(CONFIG_FILENAME);
        Self {
            sources: context.sources_root(),
            config_file: config_file.is_file().then_some(config_file),
            config: context.config().watch.clone(),
        }
    }
}

/// Check if a file is relevant for rebuilding
pub fn is_relevant_file(path: &Path) -> bool {
    if path.file_name().is_some_and(|name| name == CONFIG_FILENAME) {
        return true;
    }
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("hx"))
}

/// Watch for file changes and rebuild until `shutdown` resolves.
///
/// Runs one build on startup. Returns the number of builds started.
///
/// # Example
/// ```ignore
/// let options = WatchOptions::for_project(&orchestrator);
/// watch_and_rebuild(&orchestrator, options, tokio::signal::ctrl_c()).await?;
/// ```
pub async fn watch_and_rebuild<F>(
    orchestrator: &Orchestrator,
    options: WatchOptions,
    shutdown: F,
) -> Result<usize, WatchError>
where
    F: Future,
{
    if !options.sources.is_dir() {
        return Err(WatchError::SourceNotFound(options.sources.clone()));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let debounce = Duration::from_millis(u64::from(options.config.debounce_ms));
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
        let _ = tx.send(result);
    })
    .map_err(WatchError::WatcherInit)?;

    debouncer
        .watcher()
        .watch(&options.sources, RecursiveMode::Recursive)
        .map_err(|source| WatchError::WatchPath { path: options.sources.clone(), source })?;
    if let Some(config_file) = &options.config_file {
        debouncer
            .watcher()
            .watch(config_file, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::WatchPath { path: config_file.clone(), source })?;
    }

    let log = orchestrator.supervisor().log();
    let mut builds = 0;

    rebuild(orchestrator).await;
    builds += 1;
    log.log(LogEvent::info(format!("Watching {} for changes...", options.sources.display())));

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(builds),
            event = rx.recv() => match event {
                Some(Ok(events)) => {
                    let changed: Vec<&Path> = events
                        .iter()
                        .filter(|e| matches!(e.kind, DebouncedEventKind::Any) && is_relevant_file(&e.path))
                        .map(|e| e.path.as_path())
                        .collect();
                    if changed.is_empty() {
                        continue;
                    }

                    if options.config.clear_screen {
                        log.log(LogEvent::Clear);
                    }
                    for path in changed {
                        if let Some(name) = path.file_name() {
                            log.log(LogEvent::info(format!("Changed: {}", name.to_string_lossy())));
                        }
                    }

                    rebuild(orchestrator).await;
                    builds += 1;
                }
                Some(Err(error)) => {
                    // Non-fatal; keep watching
                    tracing::warn!(error = ?error, "watch error");
                    log.log(LogEvent::warning(format!("Watch error: {:?}", error)));
                }
                None => return Err(WatchError::ChannelClosed),
            },
        }
    }
}

async fn rebuild(orchestrator: &Orchestrator) {
    let log = orchestrator.supervisor().log();
    match orchestrator.build(BuildOptions::default()).wait().await {
        Ok(outcome) => log.log(LogEvent::info(format!("Build {}", outcome))),
        Err(BuildError::AlreadyRunning(_)) => {
            tracing::debug!("change ignored, compile in flight");
        }
        // Failures were already reported through the log
        Err(e) => tracing::debug!(error = %e, "watch build failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildContext;
    use crate::config::default_config;
    use tempfile::TempDir;

    #[test]
    fn test_is_relevant_file() {
        assert!(is_relevant_file(Path::new("Sources/arm/Player.hx")));
        assert!(is_relevant_file(Path::new("Sources/arm/Enemy.HX")));
        assert!(is_relevant_file(Path::new("/project/playmake.toml")));
        assert!(!is_relevant_file(Path::new("other.toml")));
        assert!(!is_relevant_file(Path::new("readme.md")));
        assert!(!is_relevant_file(Path::new("noextension")));
    }

    #[test]
    fn test_watch_options_for_project() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILENAME), "[project]\nname = \"game\"\n").unwrap();
        let orchestrator = Orchestrator::builder(BuildContext::new(default_config(), temp.path().to_path_buf())).build();

        let options = WatchOptions::for_project(&orchestrator);
        assert_eq!(options.sources, temp.path().join("Sources"));
        assert_eq!(options.config_file, Some(temp.path().join(CONFIG_FILENAME)));
        assert_eq!(options.config.debounce_ms, 100);
        assert!(options.config.clear_screen);
    }

    #[tokio::test]
    async fn test_watch_missing_sources() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::builder(BuildContext::new(default_config(), temp.path().to_path_buf())).build();

        let options = WatchOptions::for_project(&orchestrator);
        let result = watch_and_rebuild(&orchestrator, options, std::future::ready(())).await;
        assert!(matches!(result, Err(WatchError::SourceNotFound(_))));
    }
}
