//! Supervision of the external compile and run processes.
//!
//! The supervisor keeps at most one live process per [`Role`]. Each spawned
//! process is owned by a monitoring task that waits for it to exit, frees the
//! role slot and publishes the exit code through a `watch` channel. Callers
//! hold a cloneable [`ProcessHandle`] and await [`ProcessHandle::wait`]
//! without blocking anything else.

use crate::build::log::{LogEvent, LogSink};
use crate::build::trace::pump_traces;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{oneshot, watch};

/// How long the monitor waits for the trace reader after the process exits.
const TRACE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Role of a supervised process. One live process per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The build tool
    Compile,
    /// The launched application
    Run,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Compile => write!(f, "compile"),
            Role::Run => write!(f, "run"),
        }
    }
}

/// Liveness of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Not spawned yet
    NotStarted,
    /// Spawned and not yet reaped
    Running,
    /// Exited with a code, or `None` when killed by a signal
    Exited(Option<i32>),
}

/// Exit status of a finished process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
}

impl ExitOutcome {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// What to spawn.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Slot the process occupies
    pub role: Role,
    /// Program followed by its arguments
    pub argv: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Pipe stderr through the trace decoder
    pub trace_stderr: bool,
}

impl ProcessSpec {
    /// Create a spec for `argv` in `role`.
    pub fn new(role: Role, argv: Vec<String>) -> Self {
        Self { role, argv, cwd: None, trace_stderr: false }
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    /// Forward stderr traces to the log.
    pub fn with_trace_stderr(mut self, trace: bool) -> Self {
        self.trace_stderr = trace;
        self
    }
}

/// Errors raised when starting a process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupervisorError {
    /// Nothing to run
    #[error("Empty command line for {0} process")]
    EmptyCommand(Role),
    /// The binary could not be started
    #[error("Failed to launch {program}: {source}")]
    Launch {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
}

/// Handle to a supervised process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    role: Role,
    id: u64,
    pid: Option<u32>,
    started: Instant,
    state: watch::Receiver<ProcessState>,
}

impl ProcessHandle {
    /// Role the process occupies.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Supervisor-assigned id, unique per supervisor.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// OS process id.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the process was spawned.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Current liveness.
    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Whether the process has not been reaped yet.
    pub fn is_running(&self) -> bool {
        !matches!(self.state(), ProcessState::Exited(_))
    }

    /// Wait for the process to exit.
    pub async fn wait(&self) -> ExitOutcome {
        let mut state = self.state.clone();
        let outcome = match state.wait_for(|s| matches!(s, ProcessState::Exited(_))).await {
            Ok(state) => match *state {
                ProcessState::Exited(code) => ExitOutcome { code },
                _ => ExitOutcome { code: None },
            },
            // Monitor dropped without reporting
            Err(_) => ExitOutcome { code: None },
        };
        outcome
    }
}

/// Result of [`ProcessSupervisor::start`].
#[derive(Debug, Clone)]
pub enum Spawn {
    /// A new process was spawned
    New(ProcessHandle),
    /// The role was already live; nothing was spawned
    Existing(ProcessHandle),
}

impl Spawn {
    /// Handle of the live process.
    pub fn handle(&self) -> &ProcessHandle {
        match self {
            Spawn::New(h) | Spawn::Existing(h) => h,
        }
    }

    /// Consume into the handle.
    pub fn into_handle(self) -> ProcessHandle {
        match self {
            Spawn::New(h) | Spawn::Existing(h) => h,
        }
    }

    /// Whether a new process was spawned.
    pub fn is_new(&self) -> bool {
        matches!(self, Spawn::New(_))
    }
}

struct Slot {
    handle: ProcessHandle,
    kill: Option<oneshot::Sender<()>>,
}

type Slots = Arc<Mutex<HashMap<Role, Slot>>>;

/// Starts, monitors and reaps external processes.
#[derive(Clone)]
pub struct ProcessSupervisor {
    slots: Slots,
    log: Arc<dyn LogSink>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let live: Vec<Role> = self.slots.lock().map(|s| s.keys().copied().collect()).unwrap_or_default();
        f.debug_struct("ProcessSupervisor").field("live", &live).finish()
    }
}

impl ProcessSupervisor {
    /// Create a supervisor reporting to `log`.
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self { slots: Arc::new(Mutex::new(HashMap::new())), log, next_id: Arc::new(AtomicU64::new(1)) }
    }

    /// Start a process, or return the live one for the same role.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self, spec: ProcessSpec) -> Result<Spawn, SupervisorError> {
        let mut slots = lock(&self.slots);

        if let Some(slot) = slots.get(&spec.role) {
            if slot.handle.is_running() {
                tracing::debug!(role = %spec.role, id = slot.handle.id, "process already running");
                return Ok(Spawn::Existing(slot.handle.clone()));
            }
        }

        let (program, args) = spec.argv.split_first().ok_or(SupervisorError::EmptyCommand(spec.role))?;
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        if spec.trace_stderr {
            command.stderr(Stdio::piped());
        }

        let mut child = command
            .spawn()
            .map_err(|source| SupervisorError::Launch { program: program.clone(), source })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (state_tx, state_rx) = watch::channel(ProcessState::Running);
        let (kill_tx, kill_rx) = oneshot::channel();
        let handle = ProcessHandle {
            role: spec.role,
            id,
            pid: child.id(),
            started: Instant::now(),
            state: state_rx,
        };

        tracing::info!(role = %spec.role, id, pid = ?handle.pid, program = %program, "spawned process");
        self.log.log(LogEvent::Running { argv: spec.argv.clone() });

        let trace_task = match child.stderr.take() {
            Some(stderr) => {
                let log = Arc::clone(&self.log);
                Some(tokio::spawn(async move { pump_traces(stderr, log.as_ref()).await }))
            }
            None => None,
        };

        let slots_ref = Arc::clone(&self.slots);
        let log = Arc::clone(&self.log);
        let role = spec.role;
        let started = handle.started;
        tokio::spawn(async move {
            let mut kill_rx = kill_rx;
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(role = %role, id, error = %e, "failed to signal process");
                    }
                    child.wait().await
                }
            };

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(role = %role, id, error = %e, "failed to reap process");
                    None
                }
            };

            {
                let mut slots = lock(&slots_ref);
                if slots.get(&role).map(|s| s.handle.id) == Some(id) {
                    slots.remove(&role);
                }
            }

            // Grandchildren may hold stderr open past the exit.
            if let Some(mut task) = trace_task {
                if tokio::time::timeout(TRACE_DRAIN_TIMEOUT, &mut task).await.is_err() {
                    tracing::debug!(role = %role, id, "trace stream still open after exit");
                    task.abort();
                }
            }

            tracing::info!(role = %role, id, code = ?code, "process exited");
            if role == Role::Compile {
                log.log(LogEvent::Finished { elapsed: started.elapsed() });
            }
            let _ = state_tx.send(ProcessState::Exited(code));
        });

        slots.insert(spec.role, Slot { handle: handle.clone(), kill: Some(kill_tx) });
        Ok(Spawn::New(handle))
    }

    /// Signal the live process in `role` to stop and free the slot.
    ///
    /// Returns whether a process was live. Calling it again is a no-op.
    pub fn terminate(&self, role: Role) -> bool {
        let slot = lock(&self.slots).remove(&role);
        match slot {
            Some(mut slot) => {
                tracing::info!(role = %role, id = slot.handle.id, "terminating process");
                if let Some(kill) = slot.kill.take() {
                    let _ = kill.send(());
                }
                true
            }
            None => false,
        }
    }

    /// Whether a process is live in `role`.
    pub fn is_running(&self, role: Role) -> bool {
        lock(&self.slots).get(&role).is_some_and(|s| s.handle.is_running())
    }

    /// Handle of the live process in `role`.
    pub fn handle(&self, role: Role) -> Option<ProcessHandle> {
        lock(&self.slots).get(&role).filter(|s| s.handle.is_running()).map(|s| s.handle.clone())
    }

    /// Log sink processes report to.
    pub fn log(&self) -> &Arc<dyn LogSink> {
        &self.log
    }
}

/// Lock the slot table, recovering from a poisoned lock.
fn lock(slots: &Slots) -> std::sync::MutexGuard<'_, HashMap<Role, Slot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
