//! Build orchestration for scene-based game projects
//!
//! Drives the external build tool (khamake) and the runtimes that play its
//! output, deciding when a full compile is needed and when the cached script
//! bundle can be reused.
//!
//! # Overview
//!
//! - **Change tracking**: compare the inputs of each invocation with the last
//!   ones to decide between a full compile and a cheap patch
//! - **Process supervision**: at most one compile and one run process, with
//!   completion reported through continuations
//! - **Trace decoding**: stream the runtime's stderr and surface script traces
//! - **Launching**: embedded runtime, browser over a local file server, or
//!   the host's viewport
//!
//! # Example
//!
//! ```ignore
//! use playmake::build::{BuildContext, BuildOptions, Orchestrator};
//! use playmake::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root);
//! let orchestrator = Orchestrator::new(context, log);
//!
//! let outcome = orchestrator.build(BuildOptions::default()).wait().await?;
//! println!("{}", outcome);
//! ```

pub mod clean;
pub mod command;
pub mod context;
pub mod export;
pub mod fingerprint;
pub mod incremental;
pub mod log;
pub mod orchestrator;
pub mod package;
pub mod process;
pub mod result;
pub mod serve;
pub mod state;
pub mod target;
pub mod trace;

pub use context::*;
pub use orchestrator::{BuildOptions, CompileMode, Orchestrator, OrchestratorBuilder};
pub use result::*;
pub use state::Phase;
pub use target::*;
