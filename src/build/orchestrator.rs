//! Build, play and publish orchestration.
//!
//! The [`Orchestrator`] ties the change tracker, the process supervisor and
//! the collaborators together. Every operation runs its synchronous part
//! (export, change evaluation, spawning) immediately and returns a [`Job`];
//! the rest happens in a continuation task that runs once the compile
//! process has exited.
//!
//! # Example
//!
//! ```ignore
//! use playmake::build::{BuildContext, Orchestrator};
//! use playmake::build::log::ConsoleLog;
//!
//! let orchestrator = Orchestrator::new(context, Arc::new(ConsoleLog::new()));
//! let outcome = orchestrator.play(false).wait().await?;
//! ```

use crate::build::clean::{clean_project, clear_shader_cache, invalidate_shaders, CleanReport};
use crate::build::command::{compile_argv, krom_run_command, CompileRequest};
use crate::build::export::{ExportRequest, ProjectExporter, SceneExporter};
use crate::build::fingerprint::{parse_shader_flags, BuildInputFingerprint};
use crate::build::incremental::recompile_reason;
use crate::build::log::{LogEvent, LogSink, NullLog};
use crate::build::package::{Packager, StandardPackager};
use crate::build::process::{ProcessHandle, ProcessSpec, ProcessSupervisor, Role, Spawn};
use crate::build::result::{BuildError, Job, Launch, Outcome};
use crate::build::serve::{BrowserLauncher, LocalServer, SystemBrowser};
use crate::build::state::{BuildState, Phase, SharedState};
use crate::build::{runtime_to_target, BuildContext, RuntimeKind, TargetDescriptor};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Message logged when a compile exits unsuccessfully.
pub const BUILD_FAILED_MESSAGE: &str = "Build failed, check console";

/// What happens after a successful compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    /// Nothing; the build is done
    Build,
    /// Launch the play target
    Play,
    /// Signal the viewport runtime
    PlayViewport,
    /// Package the published build
    Publish,
}

/// Options for [`Orchestrator::build`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Export for play
    pub play: bool,
    /// Build for publishing
    pub publish: bool,
    /// Build for the host's viewport
    pub viewport: bool,
    /// Target override (defaults to the publish or play target)
    pub target: Option<TargetDescriptor>,
}

impl BuildOptions {
    /// Options for a publish build of `target`.
    pub fn publish(target: TargetDescriptor) -> Self {
        Self { publish: true, target: Some(target), ..Default::default() }
    }
}

/// Result of the export step.
#[derive(Debug, Clone, Copy)]
struct Prepared {
    recompile: bool,
    vr: bool,
}

struct Inner {
    context: BuildContext,
    state: SharedState,
    supervisor: ProcessSupervisor,
    exporter: Arc<dyn SceneExporter>,
    packager: Arc<dyn Packager>,
    browser: Arc<dyn BrowserLauncher>,
    server: tokio::sync::Mutex<Option<LocalServer>>,
    log: Arc<dyn LogSink>,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    context: BuildContext,
    log: Arc<dyn LogSink>,
    exporter: Option<Arc<dyn SceneExporter>>,
    packager: Option<Arc<dyn Packager>>,
    browser: Arc<dyn BrowserLauncher>,
}

impl OrchestratorBuilder {
    /// Set the log sink.
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    /// Set the scene exporter (defaults to [`ProjectExporter`]).
    pub fn with_exporter(mut self, exporter: Arc<dyn SceneExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Set the publish packager (defaults to [`StandardPackager`]).
    pub fn with_packager(mut self, packager: Arc<dyn Packager>) -> Self {
        self.packager = Some(packager);
        self
    }

    /// Set the browser launcher (defaults to [`SystemBrowser`]).
    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Orchestrator {
        let context = self.context;
        let exporter =
            self.exporter.unwrap_or_else(|| Arc::new(ProjectExporter::new(context.clone())));
        let packager =
            self.packager.unwrap_or_else(|| Arc::new(StandardPackager::new(context.clone())));
        let target = runtime_to_target(false, context.config().runtime.play);

        Orchestrator {
            inner: Arc::new(Inner {
                state: SharedState::new(BuildState::new(target)),
                supervisor: ProcessSupervisor::new(Arc::clone(&self.log)),
                exporter,
                packager,
                browser: self.browser,
                server: tokio::sync::Mutex::new(None),
                log: self.log,
                context,
            }),
        }
    }
}

/// Drives builds, play sessions and publishing for one project.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("project_root", &self.inner.context.project_root())
            .field("phase", &self.phase())
            .finish()
    }
}

impl Orchestrator {
    /// Start building an orchestrator.
    pub fn builder(context: BuildContext) -> OrchestratorBuilder {
        OrchestratorBuilder {
            context,
            log: Arc::new(NullLog::new()),
            exporter: None,
            packager: None,
            browser: Arc::new(SystemBrowser),
        }
    }

    /// Create an orchestrator with the default collaborators.
    pub fn new(context: BuildContext, log: Arc<dyn LogSink>) -> Self {
        Self::builder(context).with_log(log).build()
    }

    /// Build context.
    pub fn context(&self) -> &BuildContext {
        &self.inner.context
    }

    /// Process supervisor.
    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.inner.supervisor
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Whether the next play needs a full compile.
    pub fn recompile_pending(&self) -> bool {
        self.inner.state.lock().recompile
    }

    /// Scripts found modified by the last export, as dotted module names.
    pub fn modified_scripts(&self) -> Vec<String> {
        self.inner.state.lock().mod_scripts.clone()
    }

    /// Export and compile if inputs changed.
    ///
    /// Resolves to [`Outcome::UpToDate`] when the cached bundle is reused.
    pub fn build(&self, options: BuildOptions) -> Job {
        if let Err(e) = self.ensure_no_compile() {
            return Job::ready(Err(e));
        }
        self.inner.log.log(LogEvent::Clear);

        let target = self.resolve_target(&options);
        let prepared =
            match self.prepare(&target, options.play, options.publish, options.viewport) {
                Ok(prepared) => prepared,
                Err(e) => return self.fail(e),
            };

        if !prepared.recompile {
            self.set_phase(Phase::Idle);
            self.inner.log.log(LogEvent::info("Build is up to date"));
            return Job::ready(Ok(Outcome::UpToDate));
        }

        let mode = if options.publish { CompileMode::Publish } else { CompileMode::Build };
        let request = CompileRequest::new(target)
            .with_play(options.play)
            .with_publish(options.publish)
            .with_viewport(options.viewport)
            .with_vr(prepared.vr);
        self.compile(request, mode)
    }

    /// Compile if needed and launch the play target.
    ///
    /// When nothing requires a full compile this takes the [`patch`] path.
    ///
    /// [`patch`]: Orchestrator::patch
    pub fn play(&self, viewport: bool) -> Job {
        if let Err(e) = self.ensure_no_compile() {
            return Job::ready(Err(e));
        }
        self.inner.log.log(LogEvent::Clear);

        let target = runtime_to_target(viewport, self.inner.context.config().runtime.play);
        let prepared = match self.prepare(&target, true, false, viewport) {
            Ok(prepared) => prepared,
            Err(e) => return self.fail(e),
        };

        if !prepared.recompile {
            tracing::debug!(target = %target, "bundle up to date, patching");
            return self.patch();
        }

        let mode = if viewport { CompileMode::PlayViewport } else { CompileMode::Play };
        let request = CompileRequest::new(target)
            .with_play(true)
            .with_viewport(viewport)
            .with_vr(prepared.vr);
        self.compile(request, mode)
    }

    /// Refresh assets without recompiling scripts, then relaunch if needed.
    ///
    /// The continuation runs whatever the exit code and leaves the
    /// recompile flag untouched.
    pub fn patch(&self) -> Job {
        if let Err(e) = self.ensure_no_compile() {
            return Job::ready(Err(e));
        }

        let (target, viewport, vr) = {
            let st = self.inner.state.lock();
            let vr = st.tracker.previous().is_some_and(BuildInputFingerprint::has_vr);
            (st.target.clone(), st.in_viewport, vr)
        };
        let mode = if self.inner.supervisor.is_running(Role::Run) {
            CompileMode::Build
        } else if viewport {
            CompileMode::PlayViewport
        } else {
            CompileMode::Play
        };

        let request = CompileRequest::new(target.clone())
            .with_viewport(viewport)
            .with_vr(vr)
            .with_patch(true);
        let handle = match self.start_compile(&request) {
            Ok(handle) => handle,
            Err(e) => return self.fail(e),
        };

        let this = self.clone();
        Job::spawned(tokio::spawn(async move {
            let outcome = handle.wait().await;
            let result = this.on_compiled(mode, target).await?;
            Ok(Outcome::Patched { outcome, launch: result.launch().cloned() })
        }))
    }

    /// Publish a build of `target`.
    pub fn publish(&self, target: TargetDescriptor) -> Job {
        self.build(BuildOptions::publish(target))
    }

    /// Stop the running application. Returns whether one was running.
    pub fn stop(&self) -> bool {
        {
            let mut st = self.inner.state.lock();
            st.run_id = None;
            if st.phase == Phase::Running {
                st.phase = Phase::Idle;
            }
        }
        self.inner.supervisor.terminate(Role::Run)
    }

    /// Shut down the local file server if it is running.
    pub async fn stop_server(&self) {
        if let Some(mut server) = self.inner.server.lock().await.take() {
            server.shutdown();
        }
    }

    /// Remove build output and forget every tracked input.
    pub fn clean(&self) -> Result<CleanReport, BuildError> {
        let report = clean_project(&self.inner.context)?;

        {
            let mut st = self.inner.state.lock();
            st.tracker.reset();
            st.recompile = true;
            st.last_target = None;
            st.mod_scripts.clear();
            if st.phase == Phase::Failed {
                st.phase = Phase::Idle;
            }
        }
        self.inner.exporter.invalidate_material_cache();
        self.inner.log.log(LogEvent::info(report.to_string()));
        Ok(report)
    }

    fn resolve_target(&self, options: &BuildOptions) -> TargetDescriptor {
        let config = self.inner.context.config();
        match &options.target {
            Some(target) => target.clone(),
            None if options.publish => TargetDescriptor::new(config.publish.target.clone()),
            None => runtime_to_target(options.viewport, config.runtime.play),
        }
    }

    fn ensure_no_compile(&self) -> Result<(), BuildError> {
        if self.inner.supervisor.is_running(Role::Compile) {
            tracing::debug!("compile already in flight");
            return Err(BuildError::AlreadyRunning(Role::Compile));
        }
        Ok(())
    }

    fn set_phase(&self, phase: Phase) {
        self.inner.state.lock().phase = phase;
    }

    /// Report an error that ended an operation before its continuation.
    fn fail(&self, error: BuildError) -> Job {
        match &error {
            BuildError::AlreadyRunning(_) => {}
            BuildError::Launch(_) => {
                self.set_phase(Phase::Failed);
                self.inner.log.log(LogEvent::error(error.to_string()));
            }
            _ => {
                self.set_phase(Phase::Idle);
                self.inner.log.log(LogEvent::error(error.to_string()));
            }
        }
        Job::ready(Err(error))
    }

    /// Export scene data and decide whether a full compile is needed.
    fn prepare(
        &self,
        target: &TargetDescriptor,
        play: bool,
        publish: bool,
        viewport: bool,
    ) -> Result<Prepared, BuildError> {
        let mut st = self.inner.state.lock();
        st.phase = Phase::Exporting;
        st.in_viewport = viewport;
        st.is_publish = publish;
        if play {
            st.target = target.clone();
        }
        self.export_locked(&mut st, target, play, publish, viewport)
    }

    fn export_locked(
        &self,
        st: &mut BuildState,
        target: &TargetDescriptor,
        play: bool,
        publish: bool,
        viewport: bool,
    ) -> Result<Prepared, BuildError> {
        let ctx = &self.inner.context;
        let config = ctx.config();
        let exporter = &self.inner.exporter;

        if !config.runtime.cache_shaders {
            clear_shader_cache(ctx)?;
        }

        let request =
            ExportRequest { target: target.clone(), is_play: play, is_publish: publish, in_viewport: viewport };
        let snapshot = exporter.export(&request)?;

        if st.tracker.observe_camera(snapshot.camera_clip) && invalidate_shaders(ctx)? {
            tracing::info!("camera clip planes changed, compiled shaders removed");
        }

        let defines_changed = st
            .tracker
            .previous()
            .is_some_and(|p| p.shader_flags != parse_shader_flags(&snapshot.shader_flags));
        if defines_changed || !ctx.shader_manifest().is_file() {
            exporter.write_shader_manifest(&snapshot)?;
        }

        let scene = st.tracker.observe_scene(&snapshot.scene, snapshot.resolution);
        if scene.config_rewrite || !ctx.config_file().exists() {
            exporter.write_config(&snapshot)?;
        }
        if scene.config_rewrite {
            tracing::debug!(scene = %snapshot.scene, resolution = %snapshot.resolution, "scene changed");
            st.recompile = true;
        }

        let scan = st.tracker.scan_scripts(&ctx.script_dir(), &ctx.sources_root(), |script| {
            exporter.refresh_script_props(script)
        });
        if scan.any_modified() {
            exporter.refresh_trait_props();
            tracing::debug!(scripts = ?scan.modified, "scripts modified");
            st.recompile = true;
        }
        st.mod_scripts = scan.modified;

        let fingerprint = BuildInputFingerprint::from_snapshot(&snapshot, target.clone(), viewport)
            .with_publish(publish)
            .with_scripts(scan.mtimes);
        let bundle =
            if publish { ctx.publish_bundle(target) } else { ctx.script_bundle(target, viewport) };
        let cached = bundle.is_some_and(|b| b.is_file()) && ctx.shader_manifest().is_file();

        if let Some(reason) = recompile_reason(
            &fingerprint,
            st.tracker.previous(),
            target,
            st.last_target.as_ref(),
            cached,
            config.runtime.cache_compiler,
        ) {
            tracing::debug!(target = %target, reason = %reason, "recompile required");
            st.recompile = true;
        }

        let vr = fingerprint.has_vr();
        st.tracker.record(fingerprint);
        st.last_target = Some(target.clone());

        Ok(Prepared { recompile: st.recompile, vr })
    }

    fn start_compile(&self, request: &CompileRequest) -> Result<ProcessHandle, BuildError> {
        let ctx = &self.inner.context;
        let argv = compile_argv(ctx, request);
        let spec = ProcessSpec::new(Role::Compile, argv).with_cwd(Some(ctx.project_root().to_path_buf()));

        match self.inner.supervisor.start(spec)? {
            Spawn::New(handle) => {
                self.set_phase(Phase::Compiling);
                Ok(handle)
            }
            Spawn::Existing(_) => {
                self.set_phase(Phase::Compiling);
                Err(BuildError::AlreadyRunning(Role::Compile))
            }
        }
    }

    fn compile(&self, request: CompileRequest, mode: CompileMode) -> Job {
        let handle = match self.start_compile(&request) {
            Ok(handle) => handle,
            Err(e) => return self.fail(e),
        };

        let this = self.clone();
        let target = request.target;
        Job::spawned(tokio::spawn(async move {
            let outcome = handle.wait().await;
            if !outcome.success() {
                this.set_phase(Phase::Failed);
                this.inner.log.log(LogEvent::error(BUILD_FAILED_MESSAGE));
                return Err(BuildError::CompileFailed { outcome });
            }

            this.inner.state.lock().recompile = false;
            this.on_compiled(mode, target).await
        }))
    }

    async fn on_compiled(&self, mode: CompileMode, target: TargetDescriptor) -> Result<Outcome, BuildError> {
        match mode {
            CompileMode::Build => {
                let running = self.inner.supervisor.is_running(Role::Run);
                self.set_phase(if running { Phase::Running } else { Phase::Idle });
                Ok(Outcome::Compiled)
            }
            CompileMode::PlayViewport => {
                let lock = self.inner.context.lock_file();
                if let Err(e) = write_lock_file(&lock) {
                    let error = BuildError::from(e);
                    self.set_phase(Phase::Idle);
                    self.inner.log.log(LogEvent::error(error.to_string()));
                    return Err(error);
                }
                self.set_phase(Phase::Running);
                Ok(Outcome::Launched(Launch::Viewport { lock }))
            }
            CompileMode::Play => {
                let launch = match target.kind() {
                    RuntimeKind::Embedded => self.launch_embedded()?,
                    RuntimeKind::Browser => self.launch_browser().await?,
                    RuntimeKind::Native => {
                        self.set_phase(Phase::Idle);
                        Launch::Native
                    }
                };
                Ok(Outcome::Launched(launch))
            }
            CompileMode::Publish => self.package(target).await,
        }
    }

    fn launch_embedded(&self) -> Result<Launch, BuildError> {
        let run = krom_run_command(&self.inner.context);
        let spec = ProcessSpec::new(Role::Run, run.argv).with_cwd(run.cwd).with_trace_stderr(true);

        let spawn = match self.inner.supervisor.start(spec) {
            Ok(spawn) => spawn,
            Err(e) => {
                let error = BuildError::from(e);
                self.set_phase(Phase::Idle);
                self.inner.log.log(LogEvent::error(error.to_string()));
                return Err(error);
            }
        };

        let handle = spawn.handle().clone();
        {
            let mut st = self.inner.state.lock();
            st.phase = Phase::Running;
            st.run_id = Some(handle.id());
        }
        if spawn.is_new() {
            self.watch_run(handle.clone());
        }
        Ok(Launch::Embedded(handle))
    }

    /// Return to idle when the application exits; report crashes.
    fn watch_run(&self, handle: ProcessHandle) {
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = handle.wait().await;
            {
                let mut st = this.inner.state.lock();
                if st.run_id != Some(handle.id()) {
                    // Stopped or replaced
                    return;
                }
                st.run_id = None;
                if st.phase == Phase::Running {
                    st.phase = Phase::Idle;
                }
            }

            if !outcome.success() {
                let error = BuildError::RunCrashed { outcome };
                this.inner.log.log(LogEvent::error(error.to_string()));
            }
        });
    }

    async fn launch_browser(&self) -> Result<Launch, BuildError> {
        let ctx = &self.inner.context;
        let path = format!("{}/debug/html5", ctx.build_dir_name().to_string_lossy().replace('\\', "/"));

        let url = {
            let mut server = self.inner.server.lock().await;
            if server.is_none() {
                match LocalServer::start(ctx.project_root().to_path_buf(), ctx.config().runtime.port).await {
                    Ok(started) => *server = Some(started),
                    Err(e) => {
                        let error = BuildError::from(e);
                        self.set_phase(Phase::Idle);
                        self.inner.log.log(LogEvent::error(error.to_string()));
                        return Err(error);
                    }
                }
            }
            server.as_ref().map(|s| s.url(&path)).unwrap_or_default()
        };

        if let Err(e) = self.inner.browser.open(&url) {
            self.inner.log.log(LogEvent::warning(e.to_string()));
        }
        self.inner.log.log(LogEvent::info(format!("Serving {}", url)));
        self.set_phase(Phase::Running);
        Ok(Launch::Browser { url })
    }

    async fn package(&self, target: TargetDescriptor) -> Result<Outcome, BuildError> {
        self.set_phase(Phase::Publishing);

        let packager = Arc::clone(&self.inner.packager);
        let result = tokio::task::spawn_blocking(move || packager.package(&target)).await;
        self.set_phase(Phase::Idle);

        let report = match result {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                let error = BuildError::from(e);
                self.inner.log.log(LogEvent::error(error.to_string()));
                return Err(error);
            }
            Err(e) => {
                tracing::warn!(error = %e, "packaging task did not complete");
                return Err(BuildError::Cancelled);
            }
        };

        self.inner.log.log(LogEvent::info(report.to_string()));
        Ok(Outcome::Published(report))
    }
}

/// Signal the viewport runtime that a fresh bundle is ready.
fn write_lock_file(lock: &Path) -> std::io::Result<()> {
    if let Some(parent) = lock.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(lock, b"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::log::RecordingLog;
    use crate::config::{default_config, PlayRuntime};
    use std::path::PathBuf;

    fn orchestrator(play: PlayRuntime) -> Orchestrator {
        let mut config = default_config();
        config.runtime.play = play;
        config.publish.target = "krom-linux".to_string();
        Orchestrator::new(BuildContext::new(config, PathBuf::from("/p")), Arc::new(RecordingLog::new()))
    }

    #[test]
    fn test_resolve_target() {
        let orchestrator = orchestrator(PlayRuntime::Browser);

        assert_eq!(orchestrator.resolve_target(&BuildOptions::default()), TargetDescriptor::html5());
        assert_eq!(
            orchestrator.resolve_target(&BuildOptions { viewport: true, ..Default::default() }),
            TargetDescriptor::krom()
        );
        assert_eq!(
            orchestrator.resolve_target(&BuildOptions { publish: true, ..Default::default() }),
            TargetDescriptor::new("krom-linux")
        );
        assert_eq!(
            orchestrator.resolve_target(&BuildOptions::publish(TargetDescriptor::new("windows"))),
            TargetDescriptor::new("windows")
        );
    }

    #[test]
    fn test_initial_state() {
        let orchestrator = orchestrator(PlayRuntime::Native);
        assert_eq!(orchestrator.phase(), Phase::Idle);
        assert!(orchestrator.recompile_pending());
        assert!(orchestrator.modified_scripts().is_empty());
        assert!(!orchestrator.stop());
    }
}
