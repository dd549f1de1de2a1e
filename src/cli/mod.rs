//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::PlayRuntime;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// playmake - build, play and publish scene-based game projects
#[derive(Parser)]
#[command(name = "playmake")]
#[command(about = "playmake - Build, play and publish scene-based game projects with khamake")]
#[command(version)]
pub struct Cli {
    /// Path to playmake.toml (searched upward from the current directory by default)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show the commands being run
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit log events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export and compile the project if its inputs changed
    Build {
        /// Build for the publish target
        #[arg(long)]
        publish: bool,

        /// Ignore the cached script bundle
        #[arg(long)]
        no_cache: bool,
    },

    /// Compile if needed and launch the game
    Play {
        /// Build for the editor viewport and signal it through the lock file
        #[arg(long)]
        viewport: bool,

        /// Runtime to play in (krom, browser, native)
        #[arg(long)]
        runtime: Option<PlayRuntime>,

        /// Port for the local file server used by browser play
        #[arg(long)]
        port: Option<u16>,

        /// Ignore the cached script bundle
        #[arg(long)]
        no_cache: bool,
    },

    /// Build and package the project for a target
    Publish {
        /// Publish target (e.g. html5, krom-linux, windows, android-native)
        #[arg(long)]
        target: Option<String>,
    },

    /// Remove build output and generated project files
    Clean,

    /// Rebuild whenever scripts or playmake.toml change
    Watch,
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    runtime.block_on(build::run_command(cli))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_play() {
        let cli = Cli::parse_from(["playmake", "--verbose", "play", "--runtime", "browser", "--port", "9000"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Play { viewport, runtime, port, no_cache } => {
                assert!(!viewport);
                assert_eq!(runtime, Some(PlayRuntime::Browser));
                assert_eq!(port, Some(9000));
                assert!(!no_cache);
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["playmake", "publish", "--target", "windows", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Publish { target: Some(ref t) } if t == "windows"));
    }

    #[test]
    fn test_parse_invalid_runtime() {
        assert!(Cli::try_parse_from(["playmake", "play", "--runtime", "flash"]).is_err());
    }
}
