//! Command implementations (build, play, publish, clean, watch)

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use super::{Cli, Commands, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::build::export::ProjectExporter;
use crate::build::log::{ConsoleLog, JsonLog, LogSink};
use crate::build::{BuildContext, BuildOptions, Launch, Orchestrator, TargetDescriptor};
use crate::config::loader::{default_config, find_config, load_config, merge_cli_overrides, CliOverrides};
use crate::config::PlaymakeConfig;
use crate::watch::{watch_and_rebuild, WatchOptions};

/// Loaded project: config, project root and the config file it came from.
struct Project {
    config: PlaymakeConfig,
    root: PathBuf,
    config_path: Option<PathBuf>,
}

/// Find and load the project configuration.
fn load_project(explicit: Option<&Path>, verbose: bool) -> Result<Project, ExitCode> {
    let config_path = match explicit {
        Some(path) if !path.is_file() => {
            eprintln!("Error: Config file not found: {}", path.display());
            return Err(ExitCode::from(EXIT_INVALID_ARGS));
        }
        Some(path) => Some(path.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(config_path) => {
            if verbose {
                eprintln!("Using config: {}", config_path.display());
            }
            let config = load_config(Some(&config_path)).map_err(|e| {
                eprintln!("Error loading config: {}", e);
                ExitCode::from(EXIT_ERROR)
            })?;
            let root = config_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
            Ok(Project { config, root, config_path: Some(config_path) })
        }
        None => {
            if verbose {
                eprintln!("No playmake.toml found, using defaults");
            }
            let root = std::env::current_dir().unwrap_or_default();
            Ok(Project { config: default_config(), root, config_path: None })
        }
    }
}

fn overrides_for(command: &Commands) -> CliOverrides {
    match command {
        Commands::Build { no_cache, .. } => CliOverrides { no_cache: Some(*no_cache), ..Default::default() },
        Commands::Play { runtime, port, no_cache, .. } => {
            CliOverrides { runtime: *runtime, port: *port, no_cache: Some(*no_cache), ..Default::default() }
        }
        Commands::Publish { target } => CliOverrides { publish_target: target.clone(), ..Default::default() },
        Commands::Clean | Commands::Watch => CliOverrides::default(),
    }
}

/// Run a parsed command line.
pub(super) async fn run_command(cli: Cli) -> ExitCode {
    let mut project = match load_project(cli.config.as_deref(), cli.verbose) {
        Ok(project) => project,
        Err(code) => return code,
    };
    merge_cli_overrides(&mut project.config, &overrides_for(&cli.command));

    let log: Arc<dyn LogSink> = if cli.json {
        Arc::new(JsonLog::new())
    } else {
        Arc::new(ConsoleLog::new().with_verbose(cli.verbose))
    };

    let context = BuildContext::new(project.config, project.root);
    let mut exporter = ProjectExporter::new(context.clone());
    if let Some(path) = project.config_path {
        exporter = exporter.with_scene_file(path);
    }
    let orchestrator = Orchestrator::builder(context).with_log(log).with_exporter(Arc::new(exporter)).build();

    match cli.command {
        Commands::Build { publish: true, .. } | Commands::Publish { .. } => run_publish(&orchestrator).await,
        Commands::Build { .. } => run_build(&orchestrator).await,
        Commands::Play { viewport, .. } => run_play(&orchestrator, viewport).await,
        Commands::Clean => run_clean(&orchestrator),
        Commands::Watch => run_watch(&orchestrator).await,
    }
}

/// Run the build command
async fn run_build(orchestrator: &Orchestrator) -> ExitCode {
    match orchestrator.build(BuildOptions::default()).wait().await {
        Ok(outcome) => {
            tracing::debug!(outcome = %outcome, "build finished");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(_) => ExitCode::from(EXIT_ERROR),
    }
}

/// Run the publish command
async fn run_publish(orchestrator: &Orchestrator) -> ExitCode {
    let target = TargetDescriptor::new(orchestrator.context().config().publish.target.clone());
    match orchestrator.publish(target).wait().await {
        Ok(_) => ExitCode::from(EXIT_SUCCESS),
        Err(_) => ExitCode::from(EXIT_ERROR),
    }
}

/// Run the play command
///
/// Waits for the embedded runtime to exit, or for Ctrl+C while serving the
/// browser build.
async fn run_play(orchestrator: &Orchestrator, viewport: bool) -> ExitCode {
    let outcome = match orchestrator.play(viewport).wait().await {
        Ok(outcome) => outcome,
        Err(_) => return ExitCode::from(EXIT_ERROR),
    };

    match outcome.launch() {
        Some(Launch::Embedded(handle)) => {
            tokio::select! {
                exit = handle.wait() => {
                    if exit.success() { ExitCode::from(EXIT_SUCCESS) } else { ExitCode::from(EXIT_ERROR) }
                }
                _ = tokio::signal::ctrl_c() => {
                    orchestrator.stop();
                    ExitCode::from(EXIT_SUCCESS)
                }
            }
        }
        Some(Launch::Browser { url }) => {
            eprintln!("Serving {} (press Ctrl+C to stop)", url);
            let _ = tokio::signal::ctrl_c().await;
            orchestrator.stop_server().await;
            ExitCode::from(EXIT_SUCCESS)
        }
        _ => {
            tracing::debug!(outcome = %outcome, "play finished");
            ExitCode::from(EXIT_SUCCESS)
        }
    }
}

/// Run the clean command
fn run_clean(orchestrator: &Orchestrator) -> ExitCode {
    match orchestrator.clean() {
        Ok(_) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the watch command
async fn run_watch(orchestrator: &Orchestrator) -> ExitCode {
    let options = WatchOptions::for_project(orchestrator);
    eprintln!("Press Ctrl+C to stop");

    let result = watch_and_rebuild(orchestrator, options, tokio::signal::ctrl_c()).await;
    orchestrator.stop();
    match result {
        Ok(builds) => {
            tracing::info!(builds, "watch stopped");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayRuntime;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_for_play() {
        let overrides = overrides_for(&Commands::Play {
            viewport: false,
            runtime: Some(PlayRuntime::Native),
            port: Some(9000),
            no_cache: true,
        });
        assert_eq!(overrides.runtime, Some(PlayRuntime::Native));
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.no_cache, Some(true));
    }

    #[test]
    fn test_overrides_for_publish() {
        let overrides = overrides_for(&Commands::Publish { target: Some("android-native".to_string()) });
        assert_eq!(overrides.publish_target.as_deref(), Some("android-native"));
        assert!(overrides.runtime.is_none());
    }

    #[test]
    fn test_load_project_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("playmake.toml");
        std::fs::write(&path, "[project]\nname = \"demo\"\n").unwrap();

        let project = load_project(Some(&path), false).unwrap();
        assert_eq!(project.config.project.name, "demo");
        assert_eq!(project.root, temp.path());
        assert_eq!(project.config_path, Some(path));
    }

    #[test]
    fn test_load_project_missing_explicit_path() {
        let temp = TempDir::new().unwrap();
        assert!(load_project(Some(&temp.path().join("missing.toml")), false).is_err());
    }

    #[test]
    #[serial]
    fn test_load_project_defaults_without_config() {
        let temp = TempDir::new().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp.path()).unwrap();

        let project = load_project(None, false);

        std::env::set_current_dir(original).unwrap();
        let project = project.unwrap();
        assert!(project.config_path.is_none());
    }
}
