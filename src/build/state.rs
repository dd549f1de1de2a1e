//! Shared orchestration state.

use crate::build::incremental::ChangeTracker;
use crate::build::TargetDescriptor;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where the orchestrator is in a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in flight
    Idle,
    /// Exporting scene data and evaluating changes
    Exporting,
    /// The build tool is running
    Compiling,
    /// The application is running
    Running,
    /// Packaging a published build
    Publishing,
    /// The last compile failed
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Exporting => "exporting",
            Phase::Compiling => "compiling",
            Phase::Running => "running",
            Phase::Publishing => "publishing",
            Phase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Mutable state of one project's builds.
#[derive(Debug)]
pub struct BuildState {
    /// A full compile is required; cleared only by a successful compile
    pub recompile: bool,
    /// Last-seen build inputs
    pub tracker: ChangeTracker,
    /// Current phase
    pub phase: Phase,
    /// Target of the current or last play
    pub target: TargetDescriptor,
    /// Target of the previous invocation
    pub last_target: Option<TargetDescriptor>,
    /// Current invocation runs in the viewport
    pub in_viewport: bool,
    /// Current invocation is a publish
    pub is_publish: bool,
    /// Scripts modified since the previous scan, as dotted module names
    pub mod_scripts: Vec<String>,
    /// Supervisor id of the run process launched by play
    pub run_id: Option<u64>,
}

impl BuildState {
    /// Fresh state for a play target.
    pub fn new(target: TargetDescriptor) -> Self {
        Self {
            recompile: true,
            tracker: ChangeTracker::new(),
            phase: Phase::Idle,
            target,
            last_target: None,
            in_viewport: false,
            is_publish: false,
            mod_scripts: Vec::new(),
            run_id: None,
        }
    }
}

/// State shared between the orchestrator and its continuations.
///
/// The lock is never held across an `.await`.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<Mutex<BuildState>>);

impl SharedState {
    /// Wrap a state.
    pub fn new(state: BuildState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Lock the state, recovering from a poisoned lock.
    pub fn lock(&self) -> MutexGuard<'_, BuildState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_requires_recompile() {
        let state = BuildState::new(TargetDescriptor::krom());
        assert!(state.recompile);
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.last_target.is_none());
        assert!(state.tracker.previous().is_none());
    }

    #[test]
    fn test_shared_state_lock() {
        let shared = SharedState::new(BuildState::new(TargetDescriptor::html5()));
        shared.lock().phase = Phase::Compiling;
        assert_eq!(shared.clone().lock().phase, Phase::Compiling);
        assert_eq!(Phase::Compiling.to_string(), "compiling");
    }
}
