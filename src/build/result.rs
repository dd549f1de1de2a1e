//! Build result types.
//!
//! Contains the error type shared by every orchestrator operation, the
//! [`Outcome`] of a finished operation and the [`Job`] handle returned by
//! asynchronous operations.

use crate::build::clean::CleanError;
use crate::build::export::ExportError;
use crate::build::package::{PackageError, PublishReport};
use crate::build::process::{ExitOutcome, ProcessHandle, Role, SupervisorError};
use crate::build::serve::ServeError;
use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Error raised by a build operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// A subprocess could not be started
    #[error(transparent)]
    Launch(#[from] SupervisorError),
    /// The build tool exited unsuccessfully
    #[error("Compile failed ({outcome})")]
    CompileFailed {
        /// Exit status of the build tool
        outcome: ExitOutcome,
    },
    /// The launched application exited unsuccessfully
    #[error("Application exited unexpectedly ({outcome})")]
    RunCrashed {
        /// Exit status of the application
        outcome: ExitOutcome,
    },
    /// A process is already live in the role
    #[error("A {0} process is already running")]
    AlreadyRunning(Role),
    /// Scene export failed
    #[error(transparent)]
    Export(#[from] ExportError),
    /// Publish packaging failed
    #[error(transparent)]
    Package(#[from] PackageError),
    /// The local file server failed
    #[error(transparent)]
    Server(#[from] ServeError),
    /// Cleaning the project failed
    #[error(transparent)]
    Clean(#[from] CleanError),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The continuation task was aborted or panicked
    #[error("Build task was cancelled")]
    Cancelled,
}

/// How a play session was launched.
#[derive(Debug, Clone)]
pub enum Launch {
    /// The viewport runtime was signalled through the lock file
    Viewport {
        /// Lock file written
        lock: PathBuf,
    },
    /// The embedded runtime was spawned
    Embedded(ProcessHandle),
    /// The browser was pointed at the local file server
    Browser {
        /// URL opened
        url: String,
    },
    /// The build tool launched the native app itself
    Native,
}

/// Successful result of an operation.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The cached bundle was reused; nothing was compiled
    UpToDate,
    /// A build-only compile finished
    Compiled,
    /// A play session was launched
    Launched(Launch),
    /// A publish build was packaged
    Published(PublishReport),
    /// A patch compile finished and its continuation ran
    Patched {
        /// Exit status of the patch compile
        outcome: ExitOutcome,
        /// Launch performed by the continuation, if any
        launch: Option<Launch>,
    },
}

impl Outcome {
    /// Whether this outcome involved a full compile.
    pub fn compiled(&self) -> bool {
        matches!(self, Outcome::Compiled | Outcome::Launched(_) | Outcome::Published(_))
    }

    /// Launch performed by this outcome, if any.
    pub fn launch(&self) -> Option<&Launch> {
        match self {
            Outcome::Launched(launch) => Some(launch),
            Outcome::Patched { launch, .. } => launch.as_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::UpToDate => write!(f, "up to date"),
            Outcome::Compiled => write!(f, "compiled"),
            Outcome::Launched(Launch::Viewport { .. }) => write!(f, "viewport ready"),
            Outcome::Launched(Launch::Embedded(handle)) => {
                write!(f, "running (pid {})", handle.pid().map_or("?".to_string(), |p| p.to_string()))
            }
            Outcome::Launched(Launch::Browser { url }) => write!(f, "serving {}", url),
            Outcome::Launched(Launch::Native) => write!(f, "native app launched"),
            Outcome::Published(report) => write!(f, "{}", report),
            Outcome::Patched { outcome, .. } => write!(f, "patched ({})", outcome),
        }
    }
}

enum JobInner {
    Ready(Result<Outcome, BuildError>),
    Spawned(JoinHandle<Result<Outcome, BuildError>>),
}

/// Handle to an operation that may still be running.
///
/// Dropping a job detaches it; the continuation still runs.
pub struct Job {
    inner: JobInner,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("finished", &self.is_finished()).finish()
    }
}

impl Job {
    /// A job that already finished.
    pub fn ready(result: Result<Outcome, BuildError>) -> Self {
        Self { inner: JobInner::Ready(result) }
    }

    /// A job running on a spawned task.
    pub fn spawned(handle: JoinHandle<Result<Outcome, BuildError>>) -> Self {
        Self { inner: JobInner::Spawned(handle) }
    }

    /// Whether the result is available without waiting.
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            JobInner::Ready(_) => true,
            JobInner::Spawned(handle) => handle.is_finished(),
        }
    }

    /// Wait for the operation to finish.
    pub async fn wait(self) -> Result<Outcome, BuildError> {
        match self.inner {
            JobInner::Ready(result) => result,
            JobInner::Spawned(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "build continuation did not complete");
                    Err(BuildError::Cancelled)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display() {
        let err = BuildError::CompileFailed { outcome: ExitOutcome { code: Some(2) } };
        assert_eq!(err.to_string(), "Compile failed (exit code 2)");

        let err = BuildError::RunCrashed { outcome: ExitOutcome { code: None } };
        assert_eq!(err.to_string(), "Application exited unexpectedly (terminated by signal)");

        assert_eq!(
            BuildError::AlreadyRunning(Role::Compile).to_string(),
            "A compile process is already running"
        );
    }

    #[test]
    fn test_outcome_compiled() {
        assert!(Outcome::Compiled.compiled());
        assert!(Outcome::Launched(Launch::Native).compiled());
        assert!(!Outcome::UpToDate.compiled());
        assert!(!Outcome::Patched { outcome: ExitOutcome { code: Some(0) }, launch: None }.compiled());
    }

    #[test]
    fn test_outcome_launch() {
        let outcome = Outcome::Patched {
            outcome: ExitOutcome { code: Some(0) },
            launch: Some(Launch::Browser { url: "http://localhost:8040/b".to_string() }),
        };
        assert!(matches!(outcome.launch(), Some(Launch::Browser { .. })));
        assert!(Outcome::UpToDate.launch().is_none());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::UpToDate.to_string(), "up to date");
        assert_eq!(
            Outcome::Launched(Launch::Browser { url: "http://localhost:8040/x".to_string() }).to_string(),
            "serving http://localhost:8040/x"
        );
    }

    #[tokio::test]
    async fn test_job_ready() {
        let job = Job::ready(Ok(Outcome::UpToDate));
        assert!(job.is_finished());
        assert!(matches!(job.wait().await, Ok(Outcome::UpToDate)));
    }

    #[tokio::test]
    async fn test_job_spawned() {
        let job = Job::spawned(tokio::spawn(async { Ok(Outcome::Compiled) }));
        assert!(matches!(job.wait().await, Ok(Outcome::Compiled)));
    }

    #[tokio::test]
    async fn test_job_aborted() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(Outcome::Compiled)
        });
        handle.abort();
        let job = Job::spawned(handle);
        assert!(matches!(job.wait().await, Err(BuildError::Cancelled)));
    }
}
