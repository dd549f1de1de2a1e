//! playmake - Build orchestration for scene-based game projects
//!
//! This library provides functionality to:
//! - Decide when a project's script bundle must be recompiled
//! - Supervise the build tool and runtime processes
//! - Decode script traces from the runtime's stderr
//! - Launch builds in the embedded runtime, a browser or the host's viewport
//! - Package published builds

pub mod build;
pub mod cli;
pub mod config;
pub mod watch;
